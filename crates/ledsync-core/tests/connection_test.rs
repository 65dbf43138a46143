#![allow(clippy::unwrap_used)]
// Integration tests for `ConnectionManager` against an in-process device.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::sync::{broadcast, mpsc};

use common::{Script, TestDevice, dead_address, snapshot, within};
use ledsync_core::{
    ConnectionEvent, ConnectionManager, ConnectionStatus, InboundState, ReconnectPolicy,
    StateUpdate,
};

// ── Helpers ─────────────────────────────────────────────────────────

struct Harness {
    manager: ConnectionManager,
    inbound: mpsc::UnboundedReceiver<InboundState>,
    events: broadcast::Receiver<ConnectionEvent>,
}

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        max_attempts,
    }
}

fn harness(base: &url::Url, policy: ReconnectPolicy) -> Harness {
    let (tx, inbound) = mpsc::unbounded_channel();
    let (events_tx, events) = broadcast::channel(32);
    let manager = ConnectionManager::new(base, false, policy, tx, events_tx).unwrap();
    Harness {
        manager,
        inbound,
        events,
    }
}

async fn wait_for_status(manager: &ConnectionManager, want: ConnectionStatus) {
    let mut rx = manager.watch_status();
    within(rx.wait_for(|s| *s == want)).await.unwrap();
}

async fn wait_for_event(events: &mut broadcast::Receiver<ConnectionEvent>, want: ConnectionEvent) {
    within(async {
        loop {
            if events.recv().await.unwrap() == want {
                return;
            }
        }
    })
    .await;
}

// ── Open / inbound ──────────────────────────────────────────────────

#[tokio::test]
async fn test_open_requests_full_state_and_delivers_snapshot() {
    let mut device = TestDevice::start(Script {
        pushes: vec![snapshot(99)],
        ..Script::default()
    })
    .await;
    let mut h = harness(&device.base, fast_policy(5));

    h.manager.connect();
    assert_eq!(h.manager.status(), ConnectionStatus::Connecting);

    assert_eq!(device.next_frame().await, json!({ "v": true }));

    let inbound = within(h.inbound.recv()).await.unwrap();
    assert_eq!(inbound.state.bri, 99);
    assert_eq!(inbound.info.unwrap().name, "Test Strip");

    assert_eq!(h.manager.status(), ConnectionStatus::Connected);
    assert_eq!(h.manager.attempts(), 0);
    wait_for_event(&mut h.events, ConnectionEvent::Connected).await;

    h.manager.disconnect();
}

#[tokio::test]
async fn test_malformed_messages_are_dropped() {
    let device = TestDevice::start(Script {
        pushes: vec![
            "not json".into(),
            json!({ "state": { "bri": 1 } }).to_string(),
            snapshot(42),
        ],
        ..Script::default()
    })
    .await;
    let mut h = harness(&device.base, fast_policy(5));

    h.manager.connect();

    let inbound = within(h.inbound.recv()).await.unwrap();
    assert_eq!(inbound.state.bri, 42, "only the well-formed push arrives");
    assert_eq!(h.manager.status(), ConnectionStatus::Connected);
    assert_eq!(device.accepted(), 1, "no reconnect on bad payloads");

    h.manager.disconnect();
}

#[tokio::test]
async fn test_connect_is_noop_while_open() {
    let device = TestDevice::start(Script::default()).await;
    let h = harness(&device.base, fast_policy(5));

    h.manager.connect();
    h.manager.connect();
    wait_for_status(&h.manager, ConnectionStatus::Connected).await;
    h.manager.connect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(device.accepted(), 1);

    h.manager.disconnect();
}

// ── Sends ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_reaches_device_when_open() {
    let mut device = TestDevice::start(Script::default()).await;
    let h = harness(&device.base, fast_policy(5));

    h.manager.send(StateUpdate::brightness(3));
    h.manager.connect();
    wait_for_status(&h.manager, ConnectionStatus::Connected).await;

    h.manager.send(StateUpdate::brightness(5));

    assert_eq!(device.next_frame().await, json!({ "v": true }));
    assert_eq!(
        device.next_frame().await,
        json!({ "bri": 5 }),
        "the send before open was dropped"
    );

    h.manager.disconnect();
}

#[tokio::test]
async fn test_disconnect_drains_queued_sends() {
    let mut device = TestDevice::start(Script::default()).await;
    let h = harness(&device.base, fast_policy(5));

    h.manager.connect();
    wait_for_status(&h.manager, ConnectionStatus::Connected).await;

    h.manager.send(StateUpdate::brightness(1));
    h.manager.send(StateUpdate::brightness(2));
    h.manager.disconnect();
    within(h.manager.wait_closed()).await;

    assert_eq!(device.next_frame().await, json!({ "v": true }));
    assert_eq!(device.next_frame().await, json!({ "bri": 1 }));
    assert_eq!(device.next_frame().await, json!({ "bri": 2 }));
}

// ── Reconnect policy ────────────────────────────────────────────────

#[tokio::test]
async fn test_device_close_triggers_reconnect() {
    let device = TestDevice::start(Script {
        close_first: true,
        pushes: vec![snapshot(7)],
        ..Script::default()
    })
    .await;
    let mut h = harness(&device.base, fast_policy(5));

    h.manager.connect();

    let inbound = within(h.inbound.recv()).await.unwrap();
    assert_eq!(inbound.state.bri, 7);
    assert_eq!(device.accepted(), 2);
    assert_eq!(h.manager.status(), ConnectionStatus::Connected);
    assert_eq!(h.manager.attempts(), 0, "a successful open resets the counter");

    h.manager.disconnect();
}

#[tokio::test]
async fn test_reconnect_budget_is_bounded() {
    let base = dead_address().await;
    let mut h = harness(&base, fast_policy(2));

    h.manager.connect();
    wait_for_event(&mut h.events, ConnectionEvent::ReconnectExhausted).await;

    assert_eq!(h.manager.status(), ConnectionStatus::Error);
    assert_eq!(h.manager.attempts(), 2);
    assert!(!h.manager.has_pending_reconnect());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!h.manager.has_pending_reconnect(), "no further timer is scheduled");
    assert_eq!(h.manager.status(), ConnectionStatus::Error);
}

#[tokio::test]
async fn test_manual_connect_after_exhaustion_retries() {
    let base = dead_address().await;
    let mut h = harness(&base, fast_policy(1));

    h.manager.connect();
    wait_for_event(&mut h.events, ConnectionEvent::ReconnectExhausted).await;

    h.manager.connect();
    assert_eq!(h.manager.status(), ConnectionStatus::Connecting);
    wait_for_event(&mut h.events, ConnectionEvent::ReconnectExhausted).await;
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_suppresses_reconnect() {
    let device = TestDevice::start(Script::default()).await;
    let h = harness(&device.base, fast_policy(5));

    h.manager.connect();
    wait_for_status(&h.manager, ConnectionStatus::Connected).await;

    h.manager.disconnect();
    h.manager.disconnect();
    within(h.manager.wait_closed()).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.manager.status(), ConnectionStatus::Disconnected);
    assert!(!h.manager.has_pending_reconnect());
    assert_eq!(device.accepted(), 1);
}
