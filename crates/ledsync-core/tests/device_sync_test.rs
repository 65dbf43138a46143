#![allow(clippy::unwrap_used)]
// End-to-end tests for `DeviceSync`: realtime against an in-process device,
// polling and fallback against wiremock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{Script, TestDevice, snapshot, within};
use ledsync_core::{
    CoreError, DeviceState, DeviceSync, ReconnectPolicy, StateUpdate, SyncConfig, TransportMode,
    ZoneDefinition,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn realtime_config(base: &Url) -> SyncConfig {
    let mut config = SyncConfig::new(base.clone());
    config.debounce = Duration::from_millis(30);
    config.reconnect = ReconnectPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        max_attempts: 1,
    };
    config
}

fn polling_config(base: &Url) -> SyncConfig {
    let mut config = SyncConfig::new(base.clone());
    config.transport = TransportMode::Polling;
    config.poll.active = Duration::from_millis(20);
    config.debounce = Duration::from_millis(30);
    config
}

async fn wait_canonical(
    sync: &DeviceSync,
    pred: impl Fn(&DeviceState) -> bool,
) -> Arc<DeviceState> {
    let mut stream = sync.subscribe_canonical();
    within(async {
        loop {
            if let Some(state) = stream.latest() {
                if pred(&state) {
                    return state;
                }
            }
            stream.changed().await.unwrap();
        }
    })
    .await
}

fn snapshot_json(bri: u8) -> serde_json::Value {
    serde_json::from_str(&snapshot(bri)).unwrap()
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_operations_before_start_are_rejected() {
    let sync = DeviceSync::new(SyncConfig::new("http://127.0.0.1:9".parse().unwrap())).unwrap();

    let err = sync.queue_update(&StateUpdate::brightness(1)).unwrap_err();
    assert!(matches!(err, CoreError::NotStarted));
    assert!(matches!(sync.flush(), Err(CoreError::NotStarted)));
    assert!(sync.current().is_none());
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let device = TestDevice::start(Script::default()).await;
    let sync = DeviceSync::new(realtime_config(&device.base)).unwrap();

    sync.start().unwrap();
    assert!(matches!(sync.start(), Err(CoreError::AlreadyStarted)));

    sync.shutdown().await;
    sync.shutdown().await;
    assert!(matches!(
        sync.queue_update(&StateUpdate::power(false)),
        Err(CoreError::NotStarted)
    ));
}

// ── Realtime flow ───────────────────────────────────────────────────

#[tokio::test]
async fn test_slider_burst_sends_once_and_converges() {
    let mut device = TestDevice::start(Script {
        pushes: vec![snapshot(10)],
        echo: Some(snapshot(150)),
        ..Script::default()
    })
    .await;
    let sync = DeviceSync::new(realtime_config(&device.base)).unwrap();
    sync.start().unwrap();

    wait_canonical(&sync, |s| s.bri == 10).await;
    assert_eq!(device.next_frame().await, json!({ "v": true }));

    for bri in [110, 120, 130, 140, 150] {
        sync.queue_update(&StateUpdate::brightness(bri)).unwrap();
    }
    assert_eq!(sync.current().unwrap().bri, 150, "effective state is immediate");
    assert_eq!(sync.canonical().unwrap().bri, 10);

    assert_eq!(device.next_frame().await, json!({ "bri": 150 }));

    wait_canonical(&sync, |s| s.bri == 150).await;
    assert!(sync.overlay().is_empty());
    assert!(sync.pending().is_empty());

    let extra = tokio::time::timeout(Duration::from_millis(100), device.frames.recv()).await;
    assert!(extra.is_err(), "exactly one outbound write");

    sync.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_flushes_debounced_edit() {
    let mut device = TestDevice::start(Script {
        pushes: vec![snapshot(10)],
        ..Script::default()
    })
    .await;
    let mut config = realtime_config(&device.base);
    config.debounce = Duration::from_secs(60);
    let sync = DeviceSync::new(config).unwrap();
    sync.start().unwrap();

    wait_canonical(&sync, |s| s.bri == 10).await;
    sync.queue_update(&StateUpdate::brightness(77)).unwrap();
    within(sync.shutdown()).await;

    assert_eq!(device.next_frame().await, json!({ "v": true }));
    assert_eq!(device.next_frame().await, json!({ "bri": 77 }));
}

#[tokio::test]
async fn test_labels_follow_effective_state() {
    let device = TestDevice::start(Script {
        pushes: vec![snapshot(10)],
        ..Script::default()
    })
    .await;
    let sync = DeviceSync::new(realtime_config(&device.base)).unwrap();
    sync.start().unwrap();
    wait_canonical(&sync, |_| true).await;

    sync.set_zones(vec![ZoneDefinition::new(0, 30, "Desk")]);

    let labels = sync.labels(None);
    assert_eq!(labels[&0].display, "Desk");
    assert_eq!(labels[&1].display, "Shelf");

    let stats = sync.match_statistics();
    assert_eq!((stats.total, stats.matched, stats.unmatched), (2, 1, 1));
    assert!((stats.match_rate - 50.0).abs() < f64::EPSILON);

    sync.shutdown().await;
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_polling_mode_reads_and_writes_over_http() {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();

    Mock::given(method("GET"))
        .and(path("/json/si"))
        .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_json(10)))
        .mount(&server)
        .await;

    let mut written = snapshot_json(33)["state"].clone();
    written["on"] = json!(true);
    Mock::given(method("POST"))
        .and(path("/json/state"))
        .and(body_partial_json(json!({ "bri": 33, "v": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(written))
        .expect(1)
        .mount(&server)
        .await;

    // One immediate pull, then quiet so the write's answer is not overtaken.
    let mut config = polling_config(&base);
    config.poll.active = Duration::from_secs(60);
    let sync = DeviceSync::new(config).unwrap();
    sync.start().unwrap();
    assert!(sync.connection().is_none());
    assert!(sync.is_polling());

    wait_canonical(&sync, |s| s.bri == 10).await;
    assert_eq!(sync.info().unwrap().name, "Test Strip");

    sync.queue_update(&StateUpdate::brightness(33)).unwrap();
    assert!(sync.flush().unwrap());

    wait_canonical(&sync, |s| s.bri == 33).await;
    sync.shutdown().await;
}

#[tokio::test]
async fn test_pending_intent_wins_over_fresh_canonical() {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();

    Mock::given(method("GET"))
        .and(path("/json/si"))
        .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_json(200)))
        .mount(&server)
        .await;

    let mut config = polling_config(&base);
    config.debounce = Duration::from_secs(60);
    let sync = DeviceSync::new(config).unwrap();
    sync.start().unwrap();
    wait_canonical(&sync, |s| s.bri == 200).await;

    sync.queue_update(&StateUpdate::brightness(255)).unwrap();

    let mut canonical = sync.subscribe_canonical();
    within(canonical.changed()).await.unwrap();

    assert_eq!(sync.canonical().unwrap().bri, 200);
    assert_eq!(sync.current().unwrap().bri, 255);
    assert_eq!(sync.pending().bri, Some(255));

    sync.shutdown().await;
}

#[tokio::test]
async fn test_background_switches_poll_interval() {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();

    let sync = DeviceSync::new(polling_config(&base)).unwrap();
    assert!(!sync.is_background());

    sync.set_background(true);
    assert!(sync.is_background());
    sync.set_background(false);
    assert!(!sync.is_background());
}

#[tokio::test]
async fn test_exhausted_realtime_falls_back_to_polling() {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();

    // No websocket upgrade on a plain HTTP mock: every realtime open fails.
    Mock::given(method("GET"))
        .and(path("/json/si"))
        .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_json(64)))
        .mount(&server)
        .await;

    let mut config = realtime_config(&base);
    config.poll.active = Duration::from_millis(20);
    config.transport = TransportMode::Realtime {
        fallback_to_polling: true,
    };
    let sync = DeviceSync::new(config).unwrap();
    sync.start().unwrap();

    wait_canonical(&sync, |s| s.bri == 64).await;
    assert!(sync.is_polling());

    sync.shutdown().await;
    assert!(!sync.is_polling());
}
