//! `WebSocket` handler for a pair's real-time channel.
//!
//! Clients connect to `GET /ws/{room}` and exchange JSON envelopes
//! (`{"channel": ..., "data": ...}`). The relay:
//!
//! - forwards `signal` and `typing` frames verbatim to the other member,
//! - answers `ping` with `pong` carrying the same `start`, to the sender only,
//! - drops `pong` and malformed frames.
//!
//! A third connection to a room receives a policy close frame.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tandem_types::RealtimeMessage;
use tracing::{debug, warn};

use crate::state::{Membership, RelayState};

/// What to do with one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Send this text back to the sender.
    Reply(String),
    /// Forward the frame unchanged to the other member.
    Forward,
    /// Discard the frame.
    Drop,
}

/// Decide how to handle an inbound text frame.
pub fn route(text: &str) -> Route {
    match RealtimeMessage::from_json(text) {
        Ok(RealtimeMessage::Ping { start }) => {
            let pong = RealtimeMessage::Pong { start };
            match pong.to_json() {
                Ok(reply) => Route::Reply(reply),
                Err(e) => {
                    warn!("Failed to serialize pong: {e}");
                    Route::Drop
                }
            }
        }
        Ok(RealtimeMessage::Signal(_) | RealtimeMessage::Typing { .. }) => Route::Forward,
        Ok(RealtimeMessage::Pong { .. }) => Route::Drop,
        Err(e) => {
            debug!("Malformed frame dropped: {e}");
            Route::Drop
        }
    }
}

/// Upgrade an HTTP request to a `WebSocket` connection in `room`.
///
/// # Route
///
/// `GET /ws/{room}`
pub async fn ws_room(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, room, state))
}

/// Handle the `WebSocket` lifecycle: take a seat in the room, then pump
/// frames both ways until either side goes away.
async fn handle_ws(mut socket: WebSocket, room: String, state: Arc<RelayState>) {
    let mut member = match state.join(&room) {
        Ok(member) => member,
        Err(error) => {
            warn!(room, %error, "connection refused");
            let close = Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: error.to_string().into(),
            }));
            // The peer may already be gone.
            let _ = socket.send(close).await;
            return;
        }
    };
    debug!(room, connection = %member.connection(), "WebSocket client connected");

    loop {
        tokio::select! {
            // A frame from the partner.
            frame = member.recv() => {
                let Some(text) = frame else {
                    return;
                };
                if socket.send(Message::Text(text.as_ref().into())).await.is_err() {
                    debug!("WebSocket client disconnected (send failed)");
                    return;
                }
            }
            // A frame from this client.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_text(&mut socket, &member, text.as_str()).await {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(room, "WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {
                        // Binary and pong frames carry nothing for us.
                    }
                }
            }
        }
    }
}

/// Apply [`route`] to one frame. Returns `false` once the socket is dead.
async fn handle_text(socket: &mut WebSocket, member: &Membership, text: &str) -> bool {
    match route(text) {
        Route::Reply(reply) => socket.send(Message::Text(reply.into())).await.is_ok(),
        Route::Forward => {
            member.publish(text);
            true
        }
        Route::Drop => true,
    }
}
