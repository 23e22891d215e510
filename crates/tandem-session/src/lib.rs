//! Per-node session controller for the Tandem paired event stream.
//!
//! A session wires the sans-IO core to its collaborators:
//!
//! - a [`DurableStore`] holding the ordered event log,
//! - a [`Transport`] carrying ephemeral real-time messages,
//! - an [`IdentityProvider`] naming the local node.
//!
//! In-memory implementations ([`MemoryStore`], [`LoopbackHub`],
//! [`StaticIdentity`]) make two sessions pair up inside one process;
//! [`WsTransport`] connects a session to a running relay instead.
//!
//! # Modules
//!
//! - [`error`] -- Store, transport, and session errors.
//! - [`identity`] -- Local identity and profile.
//! - [`session`] -- The session task and its handle.
//! - [`store`] -- Durable log trait and the in-memory store.
//! - [`transport`] -- Real-time transport trait and the loopback hub.
//! - [`view`] -- The UI-facing session summary.
//! - [`wall`] -- Wall clock driven by the tokio timer.
//! - [`ws`] -- `WebSocket` transport to the relay.

pub mod error;
pub mod identity;
pub mod session;
pub mod store;
pub mod transport;
pub mod view;
pub mod wall;
pub mod ws;

pub use error::{SessionError, StoreError, TransportError};
pub use identity::{IdentityProvider, Profile, StaticIdentity};
pub use session::{Session, SessionConfig, SessionHandle};
pub use store::{DurableStore, MemoryStore, Snapshot, SnapshotSubscription};
pub use transport::{LoopbackHub, LoopbackTransport, Transport};
pub use view::SessionView;
pub use wall::RuntimeWallClock;
pub use ws::WsTransport;
