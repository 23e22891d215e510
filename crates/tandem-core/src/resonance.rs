//! Resonance: a bounded synchronization score for the pair.
//!
//! The score starts at a base of 100 and loses points for mood distance and
//! for channel latency above a free threshold. Both penalties are capped
//! below the base so neither can zero the score alone, and the result is
//! clamped into `0..=100`. Integer arithmetic only.

use serde::Deserialize;
use tandem_types::MoodLevel;

/// Upper bound of the score.
pub const MAX_SCORE: u8 = 100;

/// Tunable constants of the resonance computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResonancePolicy {
    /// Starting score before penalties.
    pub base: u8,
    /// Points lost per step of mood distance (max distance is 4).
    pub mood_step: u8,
    /// Latency that costs nothing, in milliseconds.
    pub latency_free_ms: u64,
    /// Milliseconds of latency above the free threshold per lost point.
    pub latency_ms_per_point: u64,
    /// Maximum points latency can cost.
    pub latency_penalty_cap: u8,
}

impl ResonancePolicy {
    /// Default policy: 10 points per mood step (40 max), one point per
    /// 20 ms above 200 ms, latency capped at 50 points.
    pub const DEFAULT: Self = Self {
        base: MAX_SCORE,
        mood_step: 10,
        latency_free_ms: 200,
        latency_ms_per_point: 20,
        latency_penalty_cap: 50,
    };

    /// Score a pair of moods and a measured round-trip latency.
    pub fn score(&self, my_mood: MoodLevel, partner_mood: MoodLevel, latency_ms: u64) -> u8 {
        let mood_penalty =
            u64::from(my_mood.distance(partner_mood)).saturating_mul(u64::from(self.mood_step));

        let excess = latency_ms.saturating_sub(self.latency_free_ms);
        let latency_penalty = excess
            .checked_div(self.latency_ms_per_point)
            .unwrap_or(0)
            .min(u64::from(self.latency_penalty_cap));

        let score = u64::from(self.base)
            .saturating_sub(mood_penalty)
            .saturating_sub(latency_penalty)
            .min(u64::from(MAX_SCORE));
        u8::try_from(score).unwrap_or(MAX_SCORE)
    }
}

impl Default for ResonancePolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Resonance under the default policy.
pub fn resonance(my_mood: MoodLevel, partner_mood: MoodLevel, latency_ms: u64) -> u8 {
    ResonancePolicy::DEFAULT.score(my_mood, partner_mood, latency_ms)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LATENCIES: [u64; 9] = [0, 1, 199, 200, 201, 220, 1_000, 5_000, u64::MAX];

    fn moods() -> Vec<MoodLevel> {
        (1..=5).map(|l| MoodLevel::new(l).unwrap()).collect()
    }

    fn mood(level: i64) -> MoodLevel {
        MoodLevel::new(level).unwrap()
    }

    #[test]
    fn aligned_moods_with_no_latency_score_full() {
        for m in moods() {
            assert_eq!(resonance(m, m, 0), MAX_SCORE);
        }
    }

    #[test]
    fn score_stays_within_bounds_and_below_maximum() {
        for my in moods() {
            for partner in moods() {
                for latency in LATENCIES {
                    let score = resonance(my, partner, latency);
                    assert!(score <= resonance(my, my, 0));
                    assert!(score <= MAX_SCORE);
                }
            }
        }
    }

    #[test]
    fn score_is_non_increasing_in_latency() {
        for my in moods() {
            for partner in moods() {
                for pair in LATENCIES.windows(2) {
                    if let [lower, higher] = *pair {
                        assert!(resonance(my, partner, lower) >= resonance(my, partner, higher));
                    }
                }
            }
        }
    }

    #[test]
    fn score_is_non_increasing_in_mood_distance() {
        let anchor = mood(1);
        for latency in LATENCIES {
            let scores: Vec<u8> = moods()
                .into_iter()
                .map(|partner| resonance(anchor, partner, latency))
                .collect();
            assert!(scores.windows(2).all(|w| matches!(w, [a, b] if a >= b)));
        }
    }

    #[test]
    fn latency_under_threshold_is_free() {
        assert_eq!(resonance(mood(3), mood(3), 200), MAX_SCORE);
        assert_eq!(resonance(mood(3), mood(3), 240), 98);
    }

    #[test]
    fn neither_penalty_alone_zeroes_the_score() {
        assert_eq!(resonance(mood(1), mood(5), 0), 60);
        assert_eq!(resonance(mood(4), mood(4), u64::MAX), 50);
        assert_eq!(resonance(mood(1), mood(5), u64::MAX), 10);
    }

    #[test]
    fn custom_policy_clamps_oversized_base() {
        let policy = ResonancePolicy {
            base: 250,
            ..ResonancePolicy::DEFAULT
        };
        assert_eq!(policy.score(mood(2), mood(2), 0), MAX_SCORE);
    }

    #[test]
    fn zero_divisor_disables_latency_penalty() {
        let policy = ResonancePolicy {
            latency_ms_per_point: 0,
            ..ResonancePolicy::DEFAULT
        };
        assert_eq!(policy.score(mood(2), mood(2), 10_000), MAX_SCORE);
    }
}
