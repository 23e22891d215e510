//! Hybrid logical clock for causally ordering events between two peers.
//!
//! Each node owns exactly one [`HybridClock`]. It stamps locally created
//! events with [`HybridClock::increment`] and folds in the timestamps of
//! remote events with [`HybridClock::receive`], so that anything created
//! afterwards orders strictly after everything already seen.
//!
//! # Design Principles
//!
//! - The wall clock is injected through [`WallClock`]; the clock itself
//!   holds no ambient global state and never reads the system time directly.
//! - Backward wall-clock jumps are absorbed by taking maxima: `physical`
//!   never decreases.
//! - All arithmetic is checked. A logical counter that would overflow
//!   carries into the next millisecond instead of wrapping. At the very top
//!   of the range there is no successor; the clock then pins itself at the
//!   ceiling and reports [`ClockError::Exhausted`] rather than issue a
//!   timestamp that orders before one it has already seen.
//! - The clock is plain owned data. Callers on multi-threaded runtimes must
//!   serialize access (the session controller does so by owning the clock
//!   inside a single task).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tandem_types::{HybridTimestamp, NodeId};

/// Errors from advancing a [`HybridClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// Both the physical and logical components are at their maximum.
    #[error("hybrid clock exhausted: no timestamp follows {physical}:{logical}")]
    Exhausted {
        /// Physical component that could not be advanced.
        physical: u64,
        /// Logical component that could not be advanced.
        logical: u32,
    },
}

/// Source of wall-clock milliseconds.
pub trait WallClock: Send + Sync {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

impl<T: WallClock + ?Sized> WallClock for Arc<T> {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

/// Wall clock backed by the operating system's real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now_millis(&self) -> u64 {
        // Times before the epoch are clamped to zero.
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Manually driven wall clock for tests and simulations.
///
/// Clones share the same underlying time, so a test can keep one handle
/// while the clock under test owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualWallClock {
    millis: Arc<AtomicU64>,
}

impl ManualWallClock {
    /// Start at the given time.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    /// Jump to an absolute time (may move backwards).
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Move forward by `delta` milliseconds, saturating at `u64::MAX`.
    pub fn advance(&self, delta: u64) {
        let _ = self
            .millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(delta))
            });
    }
}

impl WallClock for ManualWallClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Per-node hybrid logical clock.
#[derive(Debug, Clone)]
pub struct HybridClock<W = SystemWallClock> {
    /// The most recent timestamp issued or merged.
    latest: HybridTimestamp,

    /// Injected wall-clock source.
    wall: W,
}

impl<W: WallClock> HybridClock<W> {
    /// Create a clock for `node` at `physical = now`, `logical = 0`.
    pub fn new(node: NodeId, wall: W) -> Self {
        let physical = wall.now_millis();
        Self {
            latest: HybridTimestamp::new(physical, 0, node),
            wall,
        }
    }

    /// Restore a clock from a previously observed state.
    pub const fn from_parts(latest: HybridTimestamp, wall: W) -> Self {
        Self { latest, wall }
    }

    /// Issue a timestamp for a local event about to be created.
    ///
    /// If the wall clock has advanced past `physical`, the new state is
    /// `(now, 0)`; otherwise the logical counter is bumped. Successive
    /// results are strictly increasing even when the wall clock stalls or
    /// moves backwards.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Exhausted`] when the clock sits at the ceiling.
    /// The state is left unchanged.
    pub fn increment(&mut self) -> Result<HybridTimestamp, ClockError> {
        let now = self.wall.now_millis();
        let (physical, logical) = if now > self.latest.physical {
            (now, 0)
        } else {
            bump(self.latest.physical, self.latest.logical)?
        };
        self.latest.physical = physical;
        self.latest.logical = logical;
        Ok(self.latest.clone())
    }

    /// Merge the timestamp of a received remote event.
    ///
    /// `physical` becomes `max(now, local, remote)`. The logical counter
    /// continues from whichever side(s) supplied that maximum, or resets
    /// to zero when the wall clock alone is ahead.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Exhausted`] when the merge has no successor.
    /// The clock is pinned at `(u64::MAX, u32::MAX)`, so every later
    /// [`increment`](Self::increment) fails instead of ordering before
    /// `remote`.
    pub fn receive(&mut self, remote: &HybridTimestamp) -> Result<HybridTimestamp, ClockError> {
        let now = self.wall.now_millis();
        let local_physical = self.latest.physical;
        let local_logical = self.latest.logical;
        let physical = now.max(local_physical).max(remote.physical);

        let from_local = physical == local_physical;
        let from_remote = physical == remote.physical;
        let merged = match (from_local, from_remote) {
            (true, true) => bump(physical, local_logical.max(remote.logical)),
            (true, false) => bump(physical, local_logical),
            (false, true) => bump(physical, remote.logical),
            (false, false) => Ok((physical, 0)),
        };
        let (physical, logical) = merged.inspect_err(|_| {
            self.latest.physical = u64::MAX;
            self.latest.logical = u32::MAX;
        })?;

        self.latest.physical = physical;
        self.latest.logical = logical;
        Ok(self.latest.clone())
    }

    /// The most recent timestamp issued or merged.
    pub const fn current(&self) -> &HybridTimestamp {
        &self.latest
    }

    /// The node this clock belongs to.
    pub const fn node(&self) -> &NodeId {
        &self.latest.node
    }

    /// Read the injected wall clock.
    pub fn now_millis(&self) -> u64 {
        self.wall.now_millis()
    }
}

/// The successor of `(physical, logical)`, carrying into the next
/// millisecond when the logical counter is exhausted.
fn bump(physical: u64, logical: u32) -> Result<(u64, u32), ClockError> {
    if let Some(next) = logical.checked_add(1) {
        return Ok((physical, next));
    }
    physical
        .checked_add(1)
        .map(|next| (next, 0))
        .ok_or(ClockError::Exhausted { physical, logical })
}
