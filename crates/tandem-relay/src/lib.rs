//! WebSocket relay hub for the Tandem real-time channel.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws/{room}`) shared by the two peers of a
//!   pair, relaying `signal` and `typing` frames between them and
//!   answering heartbeat pings
//! - **Health endpoint** (`/health`) reporting the number of open rooms
//!
//! The relay never inspects or stores events beyond routing them; the
//! durable log lives elsewhere.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::{RelayError, ServerError};
pub use router::build_router;
pub use server::start_server;
pub use state::{Membership, RelayState};
