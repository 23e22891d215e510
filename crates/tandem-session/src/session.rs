//! The per-node session controller.
//!
//! [`Session::spawn`] starts one tokio task per node. The task exclusively
//! owns the node's [`HybridClock`] and [`Reconciler`], so no locking is
//! needed around them. It waits on:
//!
//! - commands from the [`SessionHandle`] (`transmit`, `typing`, `detach`)
//! - durable snapshots from the store subscription
//! - `signal`, `typing`, and `pong` messages from the transport
//! - the heartbeat interval
//! - the earliest presence deadline
//!
//! Each input updates the reconciled state and republishes the
//! [`SessionView`] on a `watch` channel. Detaching (or dropping every
//! handle) ends the task: transport handlers are removed, the store
//! subscription is dropped, and the timers go with the task.

use std::time::Duration;

use tandem_core::{
    HeartbeatConfig, HybridClock, PresenceConfig, PushOutcome, Reconciler, ResonancePolicy,
    TandemConfig, create_event,
};
use tandem_types::{Channel, Event, EventKind, NodeId, Payload, RealtimeMessage};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};

use crate::error::{SessionError, TransportError};
use crate::identity::{IdentityProvider, Profile};
use crate::store::{DurableStore, Snapshot, SnapshotSubscription};
use crate::transport::Transport;
use crate::view::SessionView;
use crate::wall::RuntimeWallClock;

/// Depth of the command queue between handles and the session task.
const COMMAND_CAPACITY: usize = 32;

/// Channels the session listens on.
const LISTENED: [Channel; 3] = [Channel::Signal, Channel::Typing, Channel::Pong];

/// Tunables of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Typing and nudge windows.
    pub presence: PresenceConfig,
    /// Ping interval.
    pub heartbeat: HeartbeatConfig,
    /// Resonance constants.
    pub resonance: ResonancePolicy,
}

impl From<&TandemConfig> for SessionConfig {
    fn from(config: &TandemConfig) -> Self {
        Self {
            presence: config.presence,
            heartbeat: config.heartbeat,
            resonance: config.resonance,
        }
    }
}

#[derive(Debug)]
enum Command {
    Transmit {
        payload: Payload,
        reply: oneshot::Sender<Result<Event, SessionError>>,
    },
    Typing,
    Detach {
        reply: oneshot::Sender<()>,
    },
}

/// Entry point for starting sessions.
#[derive(Debug, Clone, Copy)]
pub struct Session;

impl Session {
    /// Subscribe to the store, register transport handlers, and start the
    /// session task. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the subscription fails and
    /// [`SessionError::Transport`] if a handler cannot be registered. No
    /// task is started in either case.
    pub fn spawn<I, S, T>(
        identity: &I,
        store: S,
        transport: T,
        config: SessionConfig,
    ) -> Result<SessionHandle, SessionError>
    where
        I: IdentityProvider + ?Sized,
        S: DurableStore,
        T: Transport,
    {
        let node = identity.node_id().clone();
        let snapshots = store.subscribe()?;
        let inbox = Inbox::register(&transport, snapshots)?;

        let clock = HybridClock::new(node.clone(), RuntimeWallClock::new());
        let reconciler = Reconciler::new(node.clone(), &config.presence);
        let initial = SessionView::compute(
            reconciler.state(),
            None,
            transport.is_connected(),
            &config.resonance,
        );
        let (view_tx, view_rx) = watch::channel(initial);
        let (feed_tx, feed_rx) = watch::channel(Snapshot::from(Vec::new()));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

        let actor = Actor {
            store,
            transport,
            clock,
            reconciler,
            config,
            latency_ms: None,
            view: view_tx,
            feed: feed_tx,
        };
        let task = tokio::spawn(actor.run(command_rx, inbox));
        info!(node = %node, "session started");

        Ok(SessionHandle {
            node,
            profile: identity.profile(),
            commands: command_tx,
            view: view_rx,
            feed: feed_rx,
            task,
        })
    }
}

/// Control surface of a running session.
#[derive(Debug)]
pub struct SessionHandle {
    node: NodeId,
    profile: Profile,
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
    feed: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// The local node id.
    pub const fn node(&self) -> &NodeId {
        &self.node
    }

    /// The local profile.
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Create, send, and persist an event.
    ///
    /// The event is validated, stamped, shown optimistically (mood and
    /// battery), pushed on the real-time channel when connected, then
    /// appended to the store. Returns the stored event.
    ///
    /// # Errors
    ///
    /// [`SessionError::Payload`] for an invalid payload,
    /// [`SessionError::Store`] if the append failed (the optimistic update
    /// is rolled back), [`SessionError::Detached`] if the session ended.
    pub async fn transmit(&self, payload: Payload) -> Result<Event, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Transmit { payload, reply })
            .await
            .map_err(|_closed| SessionError::Detached)?;
        response.await.map_err(|_closed| SessionError::Detached)?
    }

    /// Tell the partner we are typing. Skipped while disconnected.
    ///
    /// # Errors
    ///
    /// [`SessionError::Detached`] if the session ended.
    pub async fn typing(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Typing)
            .await
            .map_err(|_closed| SessionError::Detached)
    }

    /// The latest published view.
    pub fn view(&self) -> SessionView {
        *self.view.borrow()
    }

    /// A receiver notified on every view change.
    pub fn watch_view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// The latest durable snapshot, in stream order.
    pub fn feed(&self) -> Snapshot {
        self.feed.borrow().clone()
    }

    /// A receiver notified on every new snapshot.
    pub fn watch_feed(&self) -> watch::Receiver<Snapshot> {
        self.feed.clone()
    }

    /// Stop the session and wait for its task to finish. Once this
    /// returns, nothing mutates the session's state.
    pub async fn detach(self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Detach { reply }).await.is_ok() {
            // A dropped reply means the task is already on its way out.
            let _ = done.await;
        }
        if let Err(error) = self.task.await {
            warn!(node = %self.node, %error, "session task ended abnormally");
        }
    }
}

/// Everything the session task reads from besides commands.
struct Inbox {
    snapshots: SnapshotSubscription,
    signals: mpsc::Receiver<RealtimeMessage>,
    typing: mpsc::Receiver<RealtimeMessage>,
    pongs: mpsc::Receiver<RealtimeMessage>,
}

impl Inbox {
    fn register<T: Transport>(
        transport: &T,
        snapshots: SnapshotSubscription,
    ) -> Result<Self, SessionError> {
        match Self::listen(transport) {
            Ok((signals, typing, pongs)) => Ok(Self {
                snapshots,
                signals,
                typing,
                pongs,
            }),
            Err(error) => {
                for channel in LISTENED {
                    transport.off(channel);
                }
                Err(error.into())
            }
        }
    }

    fn listen<T: Transport>(transport: &T) -> Result<Listeners, TransportError> {
        Ok((
            transport.on(Channel::Signal)?,
            transport.on(Channel::Typing)?,
            transport.on(Channel::Pong)?,
        ))
    }
}

type Listeners = (
    mpsc::Receiver<RealtimeMessage>,
    mpsc::Receiver<RealtimeMessage>,
    mpsc::Receiver<RealtimeMessage>,
);

struct Actor<S, T> {
    store: S,
    transport: T,
    clock: HybridClock<RuntimeWallClock>,
    reconciler: Reconciler,
    config: SessionConfig,
    latency_ms: Option<u64>,
    view: watch::Sender<SessionView>,
    feed: watch::Sender<Snapshot>,
}

impl<S: DurableStore, T: Transport> Actor<S, T> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut inbox: Inbox) {
        let period = self.config.heartbeat.ping_interval();
        let mut heartbeat = interval(period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        heartbeat.reset();
        let mut store_open = true;

        let detach_reply = loop {
            let expiry = self.until_next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Transmit { payload, reply }) => {
                        let result = self.transmit(payload).await;
                        // The caller may have stopped waiting.
                        let _ = reply.send(result);
                    }
                    Some(Command::Typing) => self.send_typing(),
                    Some(Command::Detach { reply }) => break Some(reply),
                    None => break None,
                },
                snapshot = inbox.snapshots.next(), if store_open => match snapshot {
                    Some(events) => self.on_snapshot(events),
                    None => {
                        warn!(node = %self.node(), "store subscription closed");
                        store_open = false;
                    }
                },
                Some(message) = inbox.signals.recv() => self.on_message(message),
                Some(message) = inbox.typing.recv() => self.on_message(message),
                Some(message) = inbox.pongs.recv() => self.on_message(message),
                _ = heartbeat.tick() => self.ping(),
                () = sleep(expiry.unwrap_or(Duration::MAX)), if expiry.is_some() => self.expire(),
            }
        };

        for channel in LISTENED {
            self.transport.off(channel);
        }
        drop(inbox);
        info!(node = %self.node(), "session detached");
        if let Some(reply) = detach_reply {
            let _ = reply.send(());
        }
    }

    const fn node(&self) -> &NodeId {
        self.reconciler.local()
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    fn until_next_deadline(&self) -> Option<Duration> {
        self.reconciler
            .next_deadline()
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(self.now())))
    }

    async fn transmit(&mut self, payload: Payload) -> Result<Event, SessionError> {
        let event = create_event(payload, &mut self.clock)?;
        let optimistic = self.reconciler.apply_local(&event);
        if optimistic {
            self.publish();
        }

        if self.transport.is_connected() {
            if let Err(error) = self.transport.send(RealtimeMessage::Signal(event.clone())) {
                debug!(node = %self.node(), %error, "ephemeral emit skipped");
            }
        } else {
            debug!(node = %self.node(), "offline, ephemeral emit skipped");
        }

        match self.store.append(&event).await {
            Ok(()) => {
                self.reconciler.confirm(event.timestamp());
                debug!(
                    node = %self.node(),
                    timestamp = %event.timestamp(),
                    kind = %event.kind(),
                    "event transmitted"
                );
                Ok(event)
            }
            Err(error) => {
                warn!(node = %self.node(), timestamp = %event.timestamp(), %error, "append failed");
                if self.reconciler.reject(event.timestamp()) {
                    self.publish();
                }
                Err(error.into())
            }
        }
    }

    fn send_typing(&self) {
        if !self.transport.is_connected() {
            debug!(node = %self.node(), "offline, typing signal skipped");
            return;
        }
        let message = RealtimeMessage::Typing {
            origin: self.node().clone(),
        };
        if let Err(error) = self.transport.send(message) {
            debug!(node = %self.node(), %error, "typing signal skipped");
        }
    }

    fn on_snapshot(&mut self, events: Snapshot) {
        self.reconciler.apply_snapshot(&events, &mut self.clock);
        self.feed.send_replace(events);
        self.publish();
    }

    fn on_message(&mut self, message: RealtimeMessage) {
        let now = self.now();
        match message {
            RealtimeMessage::Signal(event) => {
                let outcome = self.reconciler.apply_push(&event, now, &mut self.clock);
                if outcome == PushOutcome::Applied {
                    if event.kind() == EventKind::Nudge {
                        info!(node = %self.node(), from = %event.origin(), "nudge received");
                    }
                    self.publish();
                }
            }
            RealtimeMessage::Typing { origin } => {
                if self.reconciler.apply_typing(&origin, now) {
                    self.publish();
                }
            }
            RealtimeMessage::Pong { start } => {
                let latency = now.saturating_sub(start);
                debug!(node = %self.node(), latency_ms = latency, "heartbeat");
                self.latency_ms = Some(latency);
                self.publish();
            }
            RealtimeMessage::Ping { .. } => {}
        }
    }

    fn ping(&self) {
        // Connectivity can change without any message arriving.
        self.publish();
        if !self.transport.is_connected() {
            debug!(node = %self.node(), "offline, ping skipped");
            return;
        }
        if let Err(error) = self.transport.send(RealtimeMessage::Ping { start: self.now() }) {
            debug!(node = %self.node(), %error, "ping skipped");
        }
    }

    fn expire(&mut self) {
        if self.reconciler.expire(self.now()) {
            self.publish();
        }
    }

    fn publish(&self) {
        let next = SessionView::compute(
            self.reconciler.state(),
            self.latency_ms,
            self.transport.is_connected(),
            &self.config.resonance,
        );
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
