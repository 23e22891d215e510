//! The ephemeral real-time channel.
//!
//! A [`Transport`] carries [`RealtimeMessage`]s between the two peers with
//! no ordering or delivery guarantee. Handlers are registered per
//! [`Channel`] and receive messages through a bounded queue; a full queue
//! drops the message, which the ephemeral channel is allowed to do.
//!
//! [`LoopbackHub`] pairs two in-process endpoints and plays the role of
//! the relay: it forwards `signal` and `typing` to the other side and
//! answers `ping` with `pong` to the sender.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tandem_types::{Channel, RealtimeMessage};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;

/// Queue depth of each channel handler.
pub const HANDLER_CAPACITY: usize = 64;

/// A best-effort real-time link to the partner.
pub trait Transport: Send + Sync + 'static {
    /// Send a message; the channel is implied by the variant.
    fn send(&self, message: RealtimeMessage) -> Result<(), TransportError>;

    /// Register the handler for `channel`, replacing any previous one.
    fn on(&self, channel: Channel) -> Result<mpsc::Receiver<RealtimeMessage>, TransportError>;

    /// Remove the handler for `channel`.
    fn off(&self, channel: Channel);

    /// Whether the link is currently up.
    fn is_connected(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Side {
    A,
    B,
}

impl Side {
    const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

#[derive(Debug)]
struct HubState {
    connected: bool,
    handlers: HashMap<(Side, Channel), mpsc::Sender<RealtimeMessage>>,
}

/// In-memory relay between exactly two endpoints.
#[derive(Debug, Clone)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    /// A connected hub with no handlers.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                connected: true,
                handlers: HashMap::new(),
            })),
        }
    }

    /// The two endpoints of this hub.
    pub fn pair(&self) -> (LoopbackTransport, LoopbackTransport) {
        (self.endpoint(Side::A), self.endpoint(Side::B))
    }

    /// Bring the link up or down for both endpoints.
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
        debug!(connected, "loopback link changed");
    }

    /// Number of registered handlers across both endpoints.
    pub fn handler_count(&self) -> usize {
        self.lock().handlers.len()
    }

    fn endpoint(&self, side: Side) -> LoopbackTransport {
        LoopbackTransport {
            hub: self.clone(),
            side,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // Hub state stays consistent across a panicking holder.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One side of a [`LoopbackHub`].
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    hub: LoopbackHub,
    side: Side,
}

impl Transport for LoopbackTransport {
    fn send(&self, message: RealtimeMessage) -> Result<(), TransportError> {
        let state = self.hub.lock();
        if !state.connected {
            return Err(TransportError::Unavailable);
        }

        let (target, message) = match message {
            RealtimeMessage::Ping { start } => (self.side, RealtimeMessage::Pong { start }),
            other => (self.side.other(), other),
        };
        let channel = message.channel();
        match state.handlers.get(&(target, channel)) {
            Some(handler) => {
                if handler.try_send(message).is_err() {
                    debug!(%channel, "handler queue full or closed, message dropped");
                }
            }
            None => debug!(%channel, "no handler registered, message dropped"),
        }
        Ok(())
    }

    fn on(&self, channel: Channel) -> Result<mpsc::Receiver<RealtimeMessage>, TransportError> {
        let (sender, receiver) = mpsc::channel(HANDLER_CAPACITY);
        self.hub.lock().handlers.insert((self.side, channel), sender);
        Ok(receiver)
    }

    fn off(&self, channel: Channel) {
        self.hub.lock().handlers.remove(&(self.side, channel));
    }

    fn is_connected(&self) -> bool {
        self.hub.lock().connected
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tandem_types::NodeId;

    use super::*;

    fn typing(origin: &str) -> RealtimeMessage {
        RealtimeMessage::Typing {
            origin: NodeId::new(origin).unwrap(),
        }
    }

    #[test]
    fn messages_reach_the_other_side_only() {
        let hub = LoopbackHub::new();
        let (a, b) = hub.pair();
        let mut a_rx = a.on(Channel::Typing).unwrap();
        let mut b_rx = b.on(Channel::Typing).unwrap();

        a.send(typing("a")).unwrap();
        assert_eq!(b_rx.try_recv().unwrap(), typing("a"));
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn ping_is_answered_with_pong_to_sender() {
        let hub = LoopbackHub::new();
        let (a, b) = hub.pair();
        let mut a_pong = a.on(Channel::Pong).unwrap();
        let mut b_pong = b.on(Channel::Pong).unwrap();

        a.send(RealtimeMessage::Ping { start: 42 }).unwrap();
        assert_eq!(a_pong.try_recv().unwrap(), RealtimeMessage::Pong { start: 42 });
        assert!(b_pong.try_recv().is_err());
    }

    #[test]
    fn disconnected_link_refuses_sends() {
        let hub = LoopbackHub::new();
        let (a, _b) = hub.pair();
        hub.set_connected(false);
        assert!(!a.is_connected());
        assert_eq!(a.send(typing("a")), Err(TransportError::Unavailable));
    }

    #[test]
    fn off_removes_the_handler() {
        let hub = LoopbackHub::new();
        let (a, b) = hub.pair();
        let mut rx = b.on(Channel::Typing).unwrap();
        assert_eq!(hub.handler_count(), 1);
        b.off(Channel::Typing);
        assert_eq!(hub.handler_count(), 0);

        a.send(typing("a")).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_instead_of_failing() {
        let hub = LoopbackHub::new();
        let (a, b) = hub.pair();
        let _rx = b.on(Channel::Typing).unwrap();
        for _ in 0..=HANDLER_CAPACITY {
            a.send(typing("a")).unwrap();
        }
    }
}
