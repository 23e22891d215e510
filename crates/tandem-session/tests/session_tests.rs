//! End-to-end tests of two sessions paired over the in-memory store and
//! the loopback transport.
//!
//! The runtime clock is paused, so presence windows and heartbeats elapse
//! instantly and deterministically.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tandem_session::{
    LoopbackHub, MemoryStore, Session, SessionConfig, SessionError, SessionHandle, SessionView,
    StaticIdentity, StoreError,
};
use tandem_types::{BatteryLevel, MoodLevel, NodeId, Payload};
use tokio::sync::watch;
use tokio::time::{Instant, timeout};

struct Pair {
    hub: LoopbackHub,
    store: MemoryStore,
    alice: SessionHandle,
    bob: SessionHandle,
}

fn node(id: &str) -> NodeId {
    NodeId::new(id).unwrap()
}

fn pair() -> Pair {
    let hub = LoopbackHub::new();
    let store = MemoryStore::new();
    let (a, b) = hub.pair();
    let alice = Session::spawn(
        &StaticIdentity::new(node("alice")),
        store.clone(),
        a,
        SessionConfig::default(),
    )
    .unwrap();
    let bob = Session::spawn(
        &StaticIdentity::new(node("bob")),
        store.clone(),
        b,
        SessionConfig::default(),
    )
    .unwrap();
    Pair {
        hub,
        store,
        alice,
        bob,
    }
}

async fn wait_for(
    view: &mut watch::Receiver<SessionView>,
    condition: impl FnMut(&SessionView) -> bool,
) -> SessionView {
    *timeout(Duration::from_secs(60), view.wait_for(condition))
        .await
        .unwrap()
        .unwrap()
}

fn mood(level: Option<MoodLevel>) -> Option<u8> {
    level.map(MoodLevel::get)
}

#[tokio::test(start_paused = true)]
async fn peers_converge_on_mood() {
    let p = pair();
    let sent = p.alice.transmit(Payload::mood(4).unwrap()).await.unwrap();
    assert_eq!(sent.origin(), &node("alice"));
    assert_eq!(mood(p.alice.view().state.local_mood()), Some(4));

    let mut bob_view = p.bob.watch_view();
    let seen = wait_for(&mut bob_view, |v| mood(v.state.remote_mood()) == Some(4)).await;
    assert_eq!(seen.state.local_mood(), None);
    assert_eq!(seen.resonance, 90);
}

#[tokio::test(start_paused = true)]
async fn feeds_agree_and_replies_order_after_what_was_seen() {
    let p = pair();
    let first = p.alice.transmit(Payload::chat("hi")).await.unwrap();

    let mut bob_feed = p.bob.watch_feed();
    timeout(Duration::from_secs(5), bob_feed.wait_for(|f| f.len() == 1))
        .await
        .unwrap()
        .unwrap();
    let reply = p.bob.transmit(Payload::chat("hey")).await.unwrap();
    assert!(first.timestamp() < reply.timestamp());

    let mut alice_feed = p.alice.watch_feed();
    timeout(Duration::from_secs(5), alice_feed.wait_for(|f| f.len() == 2))
        .await
        .unwrap()
        .unwrap();
    timeout(Duration::from_secs(5), bob_feed.wait_for(|f| f.len() == 2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(p.alice.feed(), p.bob.feed());
    assert_eq!(p.store.events().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn typing_indicator_expires_after_silence() {
    let p = pair();
    let mut bob_view = p.bob.watch_view();
    let started = Instant::now();

    p.alice.typing().await.unwrap();
    wait_for(&mut bob_view, |v| v.state.is_remote_typing()).await;
    wait_for(&mut bob_view, |v| !v.state.is_remote_typing()).await;
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(!p.alice.view().state.is_remote_typing());
}

#[tokio::test(start_paused = true)]
async fn nudge_is_pending_for_its_window() {
    let p = pair();
    let mut alice_view = p.alice.watch_view();
    p.bob.transmit(Payload::nudge()).await.unwrap();

    wait_for(&mut alice_view, |v| v.state.pending_nudge()).await;
    wait_for(&mut alice_view, |v| !v.state.pending_nudge()).await;
    assert!(!p.bob.view().state.pending_nudge());
}

#[tokio::test(start_paused = true)]
async fn heartbeat_measures_latency() {
    let p = pair();
    let mut alice_view = p.alice.watch_view();
    let view = wait_for(&mut alice_view, |v| v.latency_ms.is_some()).await;
    assert_eq!(view.latency_ms, Some(0));
    assert!(view.connected);
    assert_eq!(view.resonance, 100);
}

#[tokio::test(start_paused = true)]
async fn failed_append_rolls_back_optimistic_mood() {
    let p = pair();
    p.alice.transmit(Payload::mood(2).unwrap()).await.unwrap();

    p.store.set_available(false);
    let result = p.alice.transmit(Payload::mood(5).unwrap()).await;
    assert!(matches!(
        result,
        Err(SessionError::Store(StoreError::Unavailable { .. }))
    ));
    assert_eq!(mood(p.alice.view().state.local_mood()), Some(2));
    assert_eq!(p.store.events().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_payload_is_refused_before_anything_is_sent() {
    let p = pair();
    let result = p
        .alice
        .transmit(Payload::Image {
            image: String::new(),
        })
        .await;
    assert!(matches!(result, Err(SessionError::Payload(_))));
    assert!(p.store.events().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn durable_path_works_while_offline() {
    let p = pair();
    p.hub.set_connected(false);
    p.alice.transmit(Payload::battery(10).unwrap()).await.unwrap();
    assert!(p.alice.view().low_battery());
    assert!(!p.alice.view().connected);

    let mut bob_view = p.bob.watch_view();
    let seen = wait_for(&mut bob_view, |v| {
        v.state.remote_battery().map(BatteryLevel::get) == Some(10)
    })
    .await;
    assert!(seen.partner_low_battery());
}

#[tokio::test(start_paused = true)]
async fn detach_unsubscribes_and_stops_updates() {
    let p = pair();
    assert_eq!(p.store.subscriber_count(), 2);
    assert_eq!(p.hub.handler_count(), 6);

    let alice_view = p.alice.watch_view();
    p.alice.detach().await;
    assert_eq!(p.store.subscriber_count(), 1);
    assert_eq!(p.hub.handler_count(), 3);

    p.bob.transmit(Payload::mood(1).unwrap()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(alice_view.has_changed().is_err());
}

#[tokio::test(start_paused = true)]
async fn spawn_fails_cleanly_when_store_is_down() {
    let hub = LoopbackHub::new();
    let store = MemoryStore::new();
    store.set_available(false);
    let (a, _b) = hub.pair();
    let result = Session::spawn(
        &StaticIdentity::new(node("alice")),
        store,
        a,
        SessionConfig::default(),
    );
    assert!(matches!(result, Err(SessionError::Store(_))));
    assert_eq!(hub.handler_count(), 0);
}
