//! [`Transport`] over a `WebSocket` to the relay.
//!
//! [`WsTransport::connect`] opens `ws://host:port/ws/{room}` and spawns a
//! pump task that writes queued outbound envelopes and hands inbound ones
//! to the handler registered for their channel. The link does not
//! reconnect: once the socket closes (including the policy close a full
//! room answers with), [`Transport::is_connected`] turns false and sends
//! fail with [`TransportError::Unavailable`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tandem_types::{Channel, RealtimeMessage};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use crate::error::TransportError;
use crate::transport::{HANDLER_CAPACITY, Transport};

/// Depth of the outbound envelope queue.
const OUTBOUND_CAPACITY: usize = 64;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handlers = HashMap<Channel, mpsc::Sender<RealtimeMessage>>;

#[derive(Debug, Default)]
struct Shared {
    connected: AtomicBool,
    handlers: Mutex<Handlers>,
}

impl Shared {
    fn handlers(&self) -> MutexGuard<'_, Handlers> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, text: &str) {
        let message = match RealtimeMessage::from_json(text) {
            Ok(message) => message,
            Err(error) => {
                debug!(%error, "malformed frame from relay dropped");
                return;
            }
        };
        let channel = message.channel();
        match self.handlers().get(&channel) {
            Some(handler) => {
                if handler.try_send(message).is_err() {
                    debug!(%channel, "handler queue full or closed, message dropped");
                }
            }
            None => debug!(%channel, "no handler registered, message dropped"),
        }
    }
}

/// A real-time link to one relay room.
#[derive(Debug, Clone)]
pub struct WsTransport {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<String>,
}

impl WsTransport {
    /// Connect to a relay room, e.g. `ws://127.0.0.1:8090/ws/pair-1`.
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the TCP connection or the
    /// `WebSocket` handshake fails.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (socket, _response) =
            connect_async(url).await.map_err(|error| TransportError::Connect {
                reason: error.to_string(),
            })?;
        info!(url, "connected to relay");

        let shared = Arc::new(Shared::default());
        shared.connected.store(true, Ordering::Release);
        let (outbound, queue) = mpsc::channel(OUTBOUND_CAPACITY);
        tokio::spawn(pump(socket, Arc::clone(&shared), queue));
        Ok(Self { shared, outbound })
    }
}

impl Transport for WsTransport {
    fn send(&self, message: RealtimeMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Unavailable);
        }
        let text = message.to_json().map_err(|error| TransportError::Encode {
            reason: error.to_string(),
        })?;
        match self.outbound.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!(channel = %message.channel(), "outbound queue full, message dropped");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::Unavailable),
        }
    }

    fn on(&self, channel: Channel) -> Result<mpsc::Receiver<RealtimeMessage>, TransportError> {
        let (sender, receiver) = mpsc::channel(HANDLER_CAPACITY);
        self.shared.handlers().insert(channel, sender);
        Ok(receiver)
    }

    fn off(&self, channel: Channel) {
        self.shared.handlers().remove(&channel);
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }
}

/// Move frames between the socket and the queues until either side ends.
async fn pump(socket: Socket, shared: Arc<Shared>, mut outbound: mpsc::Receiver<String>) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            queued = outbound.recv() => {
                let Some(text) = queued else {
                    // Every transport handle was dropped.
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                if let Err(error) = sink.send(Message::Text(text.into())).await {
                    debug!(%error, "relay send failed");
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.dispatch(text.as_str()),
                Some(Ok(Message::Close(close))) => {
                    info!(?close, "relay closed the link");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(%error, "relay link failed");
                    break;
                }
                None => break,
            },
        }
    }
    shared.connected.store(false, Ordering::Release);
    info!("relay link down");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn unreachable_relay_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsTransport::connect(&format!("ws://{addr}/ws/pair")).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn inbound_envelopes_reach_their_channel_handler() {
        let shared = Shared::default();
        let (sender, mut pongs) = mpsc::channel(HANDLER_CAPACITY);
        shared.handlers().insert(Channel::Pong, sender);

        shared.dispatch(r#"{"channel":"pong","data":{"start":9}}"#);
        shared.dispatch(r#"{"channel":"typing","data":{"origin":"bob"}}"#);
        shared.dispatch("garbage");

        assert_eq!(pongs.try_recv().unwrap(), RealtimeMessage::Pong { start: 9 });
        assert!(pongs.try_recv().is_err());
    }
}
