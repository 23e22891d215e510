//! Wall clock driven by the runtime's timer.
//!
//! [`RuntimeWallClock`] reads the system time once, then advances with
//! `tokio::time::Instant`. Presence deadlines and heartbeat latency are
//! therefore measured on the same clock the runtime sleeps on, and a
//! paused test runtime controls both.

use tandem_core::{SystemWallClock, WallClock};
use tokio::time::Instant;

/// Wall-clock milliseconds anchored at construction and advanced by the
/// tokio clock. Must be created inside a runtime.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeWallClock {
    anchor_millis: u64,
    started: Instant,
}

impl RuntimeWallClock {
    /// Anchor at the current system time.
    pub fn new() -> Self {
        Self::anchored_at(SystemWallClock.now_millis())
    }

    /// Anchor at an explicit wall time.
    pub fn anchored_at(anchor_millis: u64) -> Self {
        Self {
            anchor_millis,
            started: Instant::now(),
        }
    }
}

impl Default for RuntimeWallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for RuntimeWallClock {
    fn now_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.anchor_millis.saturating_add(elapsed)
    }
}
