//! Messages of the ephemeral real-time channel.
//!
//! Every message travels as `{"channel": "...", "data": ...}`. The channel
//! name doubles as the handler key for `on`/`off` registration.

use core::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::event::Event;
use crate::ids::NodeId;

/// Named channels of the real-time transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Channel {
    /// Out-of-band copies of freshly created events.
    Signal,
    /// Liveness pings from a peer that is composing a message.
    Typing,
    /// Heartbeat request carrying the sender's send time.
    Ping,
    /// Heartbeat response echoing the request's send time.
    Pong,
}

impl Channel {
    /// Every channel, in declaration order.
    pub const ALL: [Self; 4] = [Self::Signal, Self::Typing, Self::Ping, Self::Pong];

    /// The wire name of the channel.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::Typing => "typing",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message on the real-time transport.
///
/// `Signal` data uses the [`WireEvent`](crate::event::WireEvent) shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "data", rename_all = "lowercase")]
pub enum RealtimeMessage {
    /// An event pushed ahead of the durable stream.
    Signal(Event),
    /// The sender is typing.
    Typing {
        /// The typing peer.
        origin: NodeId,
    },
    /// Heartbeat request.
    Ping {
        /// Sender wall clock in milliseconds at send time.
        start: u64,
    },
    /// Heartbeat response.
    Pong {
        /// The `start` value of the answered ping.
        start: u64,
    },
}

impl RealtimeMessage {
    /// The channel this message travels on.
    pub const fn channel(&self) -> Channel {
        match self {
            Self::Signal(_) => Channel::Signal,
            Self::Typing { .. } => Channel::Typing,
            Self::Ping { .. } => Channel::Ping,
            Self::Pong { .. } => Channel::Pong,
        }
    }

    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from JSON text.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}
