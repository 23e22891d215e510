//! The UI-facing summary of a session.

use serde::Serialize;
use tandem_core::{ReconciledState, ResonancePolicy};
use tandem_types::{BatteryLevel, MoodLevel};

/// Everything a presentation layer needs to render the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Reconciled status of both peers.
    pub state: ReconciledState,
    /// Last measured heartbeat round trip, if any.
    pub latency_ms: Option<u64>,
    /// Synchronization score, 0..=100.
    pub resonance: u8,
    /// Whether the real-time link is up.
    pub connected: bool,
}

impl SessionView {
    /// Derive the view. Undeclared moods count as neutral and an
    /// unmeasured latency counts as zero.
    pub fn compute(
        state: ReconciledState,
        latency_ms: Option<u64>,
        connected: bool,
        policy: &ResonancePolicy,
    ) -> Self {
        let resonance = policy.score(
            state.local_mood().unwrap_or(MoodLevel::NEUTRAL),
            state.remote_mood().unwrap_or(MoodLevel::NEUTRAL),
            latency_ms.unwrap_or(0),
        );
        Self {
            state,
            latency_ms,
            resonance,
            connected,
        }
    }

    /// Our battery is known and below the low threshold.
    pub fn low_battery(&self) -> bool {
        self.state.local_battery().is_some_and(BatteryLevel::is_low)
    }

    /// The partner's battery is known and below the low threshold.
    pub fn partner_low_battery(&self) -> bool {
        self.state.remote_battery().is_some_and(BatteryLevel::is_low)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_state_scores_as_neutral_pair() {
        let view = SessionView::compute(
            ReconciledState::default(),
            None,
            false,
            &ResonancePolicy::DEFAULT,
        );
        assert_eq!(view.resonance, 100);
        assert!(!view.low_battery());
        assert!(!view.partner_low_battery());
    }

    #[test]
    fn latency_lowers_resonance() {
        let view = SessionView::compute(
            ReconciledState::default(),
            Some(600),
            true,
            &ResonancePolicy::DEFAULT,
        );
        assert_eq!(view.resonance, 80);
    }

    #[test]
    fn serializes_for_the_ui() {
        let view = SessionView::compute(
            ReconciledState::default(),
            Some(12),
            true,
            &ResonancePolicy::DEFAULT,
        );
        let json = serde_json::to_value(view).unwrap();
        assert_eq!(json["latencyMs"], 12);
        assert_eq!(json["connected"], true);
        assert_eq!(json["state"]["pendingNudge"], false);
    }
}
