//! Relay tests over real `WebSocket` connections.
//!
//! Each test serves the router on an ephemeral localhost port and talks to
//! it with `tokio-tungstenite` clients, or with two sessions using
//! [`WsTransport`].

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tandem_core::HeartbeatConfig;
use tandem_relay::{RelayState, build_router};
use tandem_session::{
    MemoryStore, Session, SessionConfig, SessionView, StaticIdentity, WsTransport,
};
use tandem_types::{MoodLevel, NodeId, Payload, RealtimeMessage};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn serve() -> (SocketAddr, Arc<RelayState>) {
    let state = Arc::new(RelayState::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(Arc::clone(&state));
    tokio::spawn(async move { axum::serve(listener, app).await });
    (addr, state)
}

fn room_url(addr: SocketAddr, room: &str) -> String {
    format!("ws://{addr}/ws/{room}")
}

async fn client(addr: SocketAddr, room: &str) -> Client {
    connect_async(room_url(addr, room)).await.unwrap().0
}

/// The handshake completes before the server takes the seat.
async fn wait_for_members(state: &RelayState, room: &str, members: usize) {
    timeout(WAIT, async {
        while state.member_count(room) != members {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let frame = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = frame {
            return text.as_str().to_owned();
        }
    }
}

async fn send_text(client: &mut Client, text: &str) {
    client.send(Message::Text(text.to_owned().into())).await.unwrap();
}

#[tokio::test]
async fn frames_are_forwarded_to_the_partner_only() {
    let (addr, state) = serve().await;
    let mut alice = client(addr, "pair").await;
    let mut bob = client(addr, "pair").await;
    wait_for_members(&state, "pair", 2).await;

    let typing = r#"{"channel":"typing","data":{"origin":"alice"}}"#;
    send_text(&mut alice, typing).await;
    assert_eq!(next_text(&mut bob).await, typing);

    let nudge = r#"{"channel":"signal","data":{"kind":"NUDGE","payload":{},"timestamp":"7:0:bob","origin":"bob"}}"#;
    send_text(&mut bob, nudge).await;
    assert_eq!(next_text(&mut alice).await, nudge);
}

#[tokio::test]
async fn ping_is_answered_to_the_sender_alone() {
    let (addr, state) = serve().await;
    let mut alice = client(addr, "pair").await;
    let mut bob = client(addr, "pair").await;
    wait_for_members(&state, "pair", 2).await;

    send_text(&mut alice, r#"{"channel":"ping","data":{"start":1234}}"#).await;
    let reply = RealtimeMessage::from_json(&next_text(&mut alice).await).unwrap();
    assert_eq!(reply, RealtimeMessage::Pong { start: 1234 });

    // Bob sees the next forwarded frame, not the pong.
    let typing = r#"{"channel":"typing","data":{"origin":"alice"}}"#;
    send_text(&mut alice, typing).await;
    assert_eq!(next_text(&mut bob).await, typing);
}

#[tokio::test]
async fn third_connection_gets_a_policy_close() {
    let (addr, state) = serve().await;
    let _alice = client(addr, "pair").await;
    let _bob = client(addr, "pair").await;
    wait_for_members(&state, "pair", 2).await;

    let mut carol = client(addr, "pair").await;
    let frame = timeout(WAIT, carol.next()).await.unwrap().unwrap().unwrap();
    assert!(
        matches!(&frame, Message::Close(Some(close)) if close.code == CloseCode::Policy),
        "expected a policy close, got {frame:?}"
    );
    assert_eq!(state.member_count("pair"), 2);
}

#[tokio::test]
async fn disconnect_frees_the_seat() {
    let (addr, state) = serve().await;
    let alice = client(addr, "pair").await;
    wait_for_members(&state, "pair", 1).await;

    drop(alice);
    wait_for_members(&state, "pair", 0).await;
    assert_eq!(state.room_count(), 0);
}

async fn wait_for(
    view: &mut watch::Receiver<SessionView>,
    condition: impl FnMut(&SessionView) -> bool,
) -> SessionView {
    *timeout(WAIT, view.wait_for(condition)).await.unwrap().unwrap()
}

#[tokio::test]
async fn sessions_exchange_presence_through_the_relay() {
    let (addr, state) = serve().await;
    let config = SessionConfig {
        heartbeat: HeartbeatConfig {
            ping_interval_ms: 20,
        },
        ..SessionConfig::default()
    };

    // Separate stores: anything bob learns arrives over the relay.
    let alice = Session::spawn(
        &StaticIdentity::new(NodeId::new("alice").unwrap()),
        MemoryStore::new(),
        WsTransport::connect(&room_url(addr, "pair")).await.unwrap(),
        config,
    )
    .unwrap();
    let bob = Session::spawn(
        &StaticIdentity::new(NodeId::new("bob").unwrap()),
        MemoryStore::new(),
        WsTransport::connect(&room_url(addr, "pair")).await.unwrap(),
        config,
    )
    .unwrap();
    wait_for_members(&state, "pair", 2).await;

    let mut bob_view = bob.watch_view();
    alice.transmit(Payload::mood(4).unwrap()).await.unwrap();
    let seen = wait_for(&mut bob_view, |v| {
        v.state.remote_mood().map(MoodLevel::get) == Some(4)
    })
    .await;
    assert!(seen.connected);

    alice.typing().await.unwrap();
    wait_for(&mut bob_view, |v| v.state.is_remote_typing()).await;

    let mut alice_view = alice.watch_view();
    wait_for(&mut alice_view, |v| v.latency_ms.is_some()).await;

    alice.detach().await;
    bob.detach().await;
}
