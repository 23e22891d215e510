//! Error types for the relay.

/// Errors from room membership.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The room already holds both peers.
    #[error("room {room} is full ({capacity} peers)")]
    RoomFull {
        /// The requested room.
        room: String,
        /// Maximum members per room.
        capacity: usize,
    },
}

/// Errors that can occur when starting or running the relay server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}
