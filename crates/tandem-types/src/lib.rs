//! Shared type definitions for the Tandem paired event stream.
//!
//! Every crate in the workspace speaks in these types. Wire-facing types
//! are exported to `TypeScript` via `ts-rs` so a web client can consume
//! the same shapes.
//!
//! # Modules
//!
//! - [`ids`] -- Peer identifiers and relay connection ids
//! - [`timestamp`] -- Hybrid logical timestamps and their canonical string form
//! - [`event`] -- Typed events, payload validation, and the JSON wire form
//! - [`realtime`] -- Envelopes of the ephemeral real-time channel

pub mod event;
pub mod ids;
pub mod realtime;
pub mod timestamp;

// Re-export all public types at crate root for convenience.
pub use event::{
    BatteryLevel, DecodeError, Event, EventKind, InvalidPayloadError, MoodLevel, Payload,
    WireEvent,
};
pub use ids::{ConnectionId, EmptyNodeId, NodeId};
pub use realtime::{Channel, RealtimeMessage};
pub use timestamp::{ClockParseError, HybridTimestamp};
