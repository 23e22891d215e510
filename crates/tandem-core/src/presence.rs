//! Self-expiring presence flags (remote typing, pending nudge).
//!
//! A [`PresenceFlag`] is a two-state machine:
//!
//! ```text
//!            signal                 signal (restart expiry)
//!   Idle ------------> Active ----------------+
//!    ^                   |  ^                 |
//!    |    now >= expiry  |  +-----------------+
//!    +-------------------+
//! ```
//!
//! Time is always supplied by the caller in wall-clock milliseconds; the
//! flag never reads a clock or owns a timer.

use serde::Serialize;

/// A flag that clears itself a fixed window after the last signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PresenceFlag {
    /// No recent signal.
    #[default]
    Idle,
    /// Raised until `expires_at`.
    Active {
        /// Wall-clock millisecond at which the flag drops.
        expires_at: u64,
    },
}

impl PresenceFlag {
    /// Raise (or re-raise) the flag for `window_ms` from `now`.
    pub const fn signal(&mut self, now: u64, window_ms: u64) {
        *self = Self::Active {
            expires_at: now.saturating_add(window_ms),
        };
    }

    /// Drop the flag if its window has elapsed. Returns whether it changed.
    pub const fn expire(&mut self, now: u64) -> bool {
        match *self {
            Self::Active { expires_at } if now >= expires_at => {
                *self = Self::Idle;
                true
            }
            _ => false,
        }
    }

    /// Whether the flag is currently raised.
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// When the flag will drop, if it is raised.
    pub const fn deadline(&self) -> Option<u64> {
        match *self {
            Self::Active { expires_at } => Some(expires_at),
            Self::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let flag = PresenceFlag::default();
        assert!(!flag.is_active());
        assert_eq!(flag.deadline(), None);
    }

    #[test]
    fn signal_raises_until_window_elapses() {
        let mut flag = PresenceFlag::Idle;
        flag.signal(1_000, 3_000);
        assert!(flag.is_active());
        assert!(!flag.expire(3_999));
        assert!(flag.is_active());
        assert!(flag.expire(4_000));
        assert!(!flag.is_active());
    }

    #[test]
    fn repeated_signal_restarts_window() {
        let mut flag = PresenceFlag::Idle;
        flag.signal(0, 3_000);
        flag.signal(2_000, 3_000);
        assert!(!flag.expire(3_500));
        assert_eq!(flag.deadline(), Some(5_000));
    }

    #[test]
    fn expiring_idle_is_a_no_op() {
        let mut flag = PresenceFlag::Idle;
        assert!(!flag.expire(u64::MAX));
    }
}
