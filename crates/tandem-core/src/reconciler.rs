//! Merging the durable log and the ephemeral channel into one view.
//!
//! The [`Reconciler`] folds four inputs into a [`ReconciledState`]:
//!
//! 1. **Durable snapshots**: the full ordered stream, the source of truth
//!    for mood and battery. Each snapshot replaces those fields outright.
//! 2. **Ephemeral pushes**: single events from the real-time channel,
//!    applied as a low-latency preview between snapshots.
//! 3. **Typing signals**: presence only, never part of the stream.
//! 4. **Local optimistic events**: our own mood and battery changes, shown
//!    immediately and rolled back if the durable append fails.
//!
//! Selection is by HLC order, never by position in a snapshot. The
//! reconciler is sans-IO: every time-dependent call takes `now` in wall
//! milliseconds, and the caller decides when to call [`Reconciler::expire`]
//! using [`Reconciler::next_deadline`].

use serde::Serialize;
use tandem_types::{BatteryLevel, Event, EventKind, HybridTimestamp, MoodLevel, NodeId, Payload};
use tracing::{debug, warn};

use crate::clock::{HybridClock, WallClock};
use crate::config::PresenceConfig;
use crate::presence::PresenceFlag;

/// The derived status of both peers.
///
/// Level fields are `None` until a matching event has been observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledState {
    local_mood: Option<MoodLevel>,
    remote_mood: Option<MoodLevel>,
    local_battery: Option<BatteryLevel>,
    remote_battery: Option<BatteryLevel>,
    is_remote_typing: bool,
    pending_nudge: bool,
}

impl ReconciledState {
    /// Our own latest mood.
    pub const fn local_mood(&self) -> Option<MoodLevel> {
        self.local_mood
    }

    /// The partner's latest mood.
    pub const fn remote_mood(&self) -> Option<MoodLevel> {
        self.remote_mood
    }

    /// Our own latest battery report.
    pub const fn local_battery(&self) -> Option<BatteryLevel> {
        self.local_battery
    }

    /// The partner's latest battery report.
    pub const fn remote_battery(&self) -> Option<BatteryLevel> {
        self.remote_battery
    }

    /// Whether the partner typed within the typing window.
    pub const fn is_remote_typing(&self) -> bool {
        self.is_remote_typing
    }

    /// Whether a nudge arrived within the nudge window.
    pub const fn pending_nudge(&self) -> bool {
        self.pending_nudge
    }
}

/// Effect of an ephemeral push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Our own event echoed back; dropped.
    Suppressed,
    /// A remote level or the nudge flag changed.
    Applied,
    /// The kind is only rendered from the durable stream.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Stamped<T> {
    at: HybridTimestamp,
    value: T,
}

/// Latest mood and battery of one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Levels {
    mood: Option<Stamped<MoodLevel>>,
    battery: Option<Stamped<BatteryLevel>>,
}

impl Levels {
    /// Keep the event if it is later than what is held.
    fn observe(&mut self, event: &Event) {
        match event.payload() {
            Payload::Mood { level } => keep_latest(&mut self.mood, event.timestamp(), *level),
            Payload::Battery { level } => {
                keep_latest(&mut self.battery, event.timestamp(), *level);
            }
            Payload::Chat { .. } | Payload::Image { .. } | Payload::Nudge => {}
        }
    }

    /// Take the event regardless of order.
    fn preview(&mut self, event: &Event) {
        let at = event.timestamp().clone();
        match event.payload() {
            Payload::Mood { level } => self.mood = Some(Stamped { at, value: *level }),
            Payload::Battery { level } => self.battery = Some(Stamped { at, value: *level }),
            Payload::Chat { .. } | Payload::Image { .. } | Payload::Nudge => {}
        }
    }

    fn mood(&self) -> Option<MoodLevel> {
        self.mood.as_ref().map(|s| s.value)
    }

    fn battery(&self) -> Option<BatteryLevel> {
        self.battery.as_ref().map(|s| s.value)
    }
}

fn keep_latest<T>(slot: &mut Option<Stamped<T>>, at: &HybridTimestamp, value: T) {
    if slot.as_ref().is_none_or(|held| *at > held.at) {
        *slot = Some(Stamped {
            at: at.clone(),
            value,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    Pending,
    /// The store accepted the append but no snapshot has carried it yet.
    Acknowledged,
}

#[derive(Debug, Clone)]
struct Optimistic {
    event: Event,
    confirmation: Confirmation,
}

/// Per-node reconciliation state machine.
#[derive(Debug, Clone)]
pub struct Reconciler {
    local: NodeId,
    typing_window_ms: u64,
    nudge_window_ms: u64,
    durable_local: Levels,
    remote: Levels,
    optimistic: Vec<Optimistic>,
    remote_typing: PresenceFlag,
    nudge: PresenceFlag,
}

impl Reconciler {
    /// A reconciler for `local` with nothing observed yet.
    pub fn new(local: NodeId, presence: &PresenceConfig) -> Self {
        Self {
            local,
            typing_window_ms: presence.typing_window_ms,
            nudge_window_ms: presence.nudge_window_ms,
            durable_local: Levels::default(),
            remote: Levels::default(),
            optimistic: Vec::new(),
            remote_typing: PresenceFlag::Idle,
            nudge: PresenceFlag::Idle,
        }
    }

    /// The node this reconciler views the stream from.
    pub const fn local(&self) -> &NodeId {
        &self.local
    }

    /// Replace mood and battery from a full durable snapshot.
    ///
    /// Optimistic local events present in the snapshot are settled. The
    /// clock receives the snapshot's latest timestamp; the merged clock
    /// state is returned, or `None` for an empty snapshot or when the clock
    /// cannot advance past it. Typing and nudge flags are not touched.
    pub fn apply_snapshot<W: WallClock>(
        &mut self,
        events: &[Event],
        clock: &mut HybridClock<W>,
    ) -> Option<HybridTimestamp> {
        let mut durable_local = Levels::default();
        let mut remote = Levels::default();
        for event in events {
            if event.is_from(&self.local) {
                durable_local.observe(event);
            } else {
                remote.observe(event);
            }
        }
        self.durable_local = durable_local;
        self.remote = remote;

        let before = self.optimistic.len();
        self.optimistic.retain(|entry| {
            !events
                .iter()
                .any(|event| event.timestamp() == entry.event.timestamp())
        });
        let settled = before.saturating_sub(self.optimistic.len());

        let merged = events
            .iter()
            .map(Event::timestamp)
            .max()
            .and_then(|latest| match clock.receive(latest) {
                Ok(merged) => Some(merged),
                Err(error) => {
                    warn!(node = %self.local, %error, "snapshot timestamp not merged");
                    None
                }
            });

        debug!(
            node = %self.local,
            events = events.len(),
            settled,
            "applied durable snapshot"
        );
        merged
    }

    /// Apply one event from the ephemeral channel.
    pub fn apply_push<W: WallClock>(
        &mut self,
        event: &Event,
        now: u64,
        clock: &mut HybridClock<W>,
    ) -> PushOutcome {
        if event.is_from(&self.local) {
            debug!(node = %self.local, timestamp = %event.timestamp(), "suppressed echo");
            return PushOutcome::Suppressed;
        }
        if let Err(error) = clock.receive(event.timestamp()) {
            warn!(node = %self.local, %error, "pushed timestamp not merged");
        }

        match event.kind() {
            EventKind::Mood | EventKind::Battery => {
                self.remote.preview(event);
                PushOutcome::Applied
            }
            EventKind::Nudge => {
                self.nudge.signal(now, self.nudge_window_ms);
                PushOutcome::Applied
            }
            EventKind::Chat | EventKind::Image => PushOutcome::Deferred,
        }
    }

    /// Record a typing signal. Returns `false` for our own signal.
    pub fn apply_typing(&mut self, origin: &NodeId, now: u64) -> bool {
        if origin == &self.local {
            return false;
        }
        self.remote_typing.signal(now, self.typing_window_ms);
        true
    }

    /// Show a locally created mood or battery event before the store
    /// confirms it. Other kinds and foreign events are ignored.
    pub fn apply_local(&mut self, event: &Event) -> bool {
        if !event.is_from(&self.local)
            || !matches!(event.kind(), EventKind::Mood | EventKind::Battery)
            || self
                .optimistic
                .iter()
                .any(|entry| entry.event.timestamp() == event.timestamp())
        {
            return false;
        }
        self.optimistic.push(Optimistic {
            event: event.clone(),
            confirmation: Confirmation::Pending,
        });
        true
    }

    /// The durable append of the event stamped `timestamp` succeeded.
    ///
    /// The value stays visible until a snapshot carries the event.
    pub fn confirm(&mut self, timestamp: &HybridTimestamp) -> bool {
        let Some(entry) = self
            .optimistic
            .iter_mut()
            .find(|entry| entry.event.timestamp() == timestamp)
        else {
            return false;
        };
        entry.confirmation = Confirmation::Acknowledged;
        true
    }

    /// The durable append of the event stamped `timestamp` failed: drop
    /// it so the local level falls back to what remains.
    pub fn reject(&mut self, timestamp: &HybridTimestamp) -> bool {
        let before = self.optimistic.len();
        self.optimistic
            .retain(|entry| entry.event.timestamp() != timestamp);
        let removed = self.optimistic.len() != before;
        if removed {
            debug!(node = %self.local, %timestamp, "rolled back optimistic event");
        }
        removed
    }

    /// Whether any local event still awaits the store's answer.
    pub fn has_unconfirmed(&self) -> bool {
        self.optimistic
            .iter()
            .any(|entry| entry.confirmation == Confirmation::Pending)
    }

    /// Clear presence flags whose window has elapsed. Returns whether
    /// anything changed.
    pub const fn expire(&mut self, now: u64) -> bool {
        let typing = self.remote_typing.expire(now);
        let nudge = self.nudge.expire(now);
        typing || nudge
    }

    /// The earliest time at which [`Self::expire`] will change something.
    pub fn next_deadline(&self) -> Option<u64> {
        [self.remote_typing.deadline(), self.nudge.deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// The current derived state.
    pub fn state(&self) -> ReconciledState {
        let mut local = self.durable_local.clone();
        for entry in &self.optimistic {
            local.observe(&entry.event);
        }
        ReconciledState {
            local_mood: local.mood(),
            remote_mood: self.remote.mood(),
            local_battery: local.battery(),
            remote_battery: self.remote.battery(),
            is_remote_typing: self.remote_typing.is_active(),
            pending_nudge: self.nudge.is_active(),
        }
    }
}
