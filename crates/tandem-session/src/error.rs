//! Error types for the session layer.
//!
//! Store and transport failures are kept apart: a store failure is
//! surfaced to the caller of `transmit`, while a transport failure is
//! logged and skipped because the durable path stays authoritative.

use tandem_core::{ClockError, CreateEventError};
use tandem_types::InvalidPayloadError;

/// Errors from a [`DurableStore`](crate::store::DurableStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store cannot accept or serve events right now.
    #[error("durable store unavailable: {reason}")]
    Unavailable {
        /// What made the store unavailable.
        reason: String,
    },
}

/// Errors from a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The real-time connection is down.
    #[error("realtime transport unavailable")]
    Unavailable,

    /// The relay could not be reached.
    #[error("failed to connect to relay: {reason}")]
    Connect {
        /// The handshake or socket failure.
        reason: String,
    },

    /// A message could not be encoded for the wire.
    #[error("failed to encode realtime message: {reason}")]
    Encode {
        /// The serializer's explanation.
        reason: String,
    },
}

/// Errors surfaced by a [`SessionHandle`](crate::session::SessionHandle).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The payload failed validation; nothing was stamped or sent.
    #[error("invalid payload: {0}")]
    Payload(#[from] InvalidPayloadError),

    /// The local clock cannot issue another timestamp; nothing was sent.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// The durable append failed; the optimistic update was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The transport refused a handler registration at startup.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session task has ended.
    #[error("session detached")]
    Detached,
}

impl From<CreateEventError> for SessionError {
    fn from(error: CreateEventError) -> Self {
        match error {
            CreateEventError::Payload(error) => Self::Payload(error),
            CreateEventError::Clock(error) => Self::Clock(error),
        }
    }
}
