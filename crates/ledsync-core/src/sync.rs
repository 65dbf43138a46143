// ── Device synchronization facade ──
//
// One `DeviceSync` per device endpoint, shared by every consumer of that
// device. Wires the transports, the coalescer and the merge engine
// together and exposes canonical/effective state as watch streams.
//
// Inbound state from either transport flows through one mpsc channel into
// a pump task, so snapshots apply strictly in arrival order.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use ledsync_api::DeviceClient;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coalescer::UpdateCoalescer;
use crate::config::{SyncConfig, TransportMode};
use crate::connection::ConnectionManager;
use crate::error::CoreError;
use crate::labels::{self, MatchStatistics};
use crate::model::{
    DeviceInfo, DeviceState, SegmentLabel, StateSnapshot, StateUpdate, ZoneDefinition,
};
use crate::polling::PollingAdapter;
use crate::stream::{Slot, StateStream};
use crate::transport::{
    ConnectionEvent, ConnectionStatus, InboundReceiver, InboundSender, InboundState, UpdateSink,
};

const EVENT_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

/// The synchronization core for one device. Cheaply cloneable.
///
/// Construct once per endpoint and hand clones to every consumer: the
/// device only accepts a handful of concurrent realtime channels.
#[derive(Clone)]
pub struct DeviceSync {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    config: SyncConfig,
    client: DeviceClient,
    connection: Option<ConnectionManager>,
    polling: PollingAdapter,
    coalescer: UpdateCoalescer,
    /// Same channel the transports feed; fetched snapshots queue behind them.
    inbound: InboundSender,
    events: broadcast::Sender<ConnectionEvent>,
    canonical: watch::Sender<Slot<DeviceState>>,
    effective: watch::Sender<Slot<DeviceState>>,
    info: watch::Sender<Slot<DeviceInfo>>,
    zones: Mutex<Arc<Vec<ZoneDefinition>>>,
    /// Serializes effective-state recomputation between the pump and callers.
    publish: Mutex<()>,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    phase: Phase,
    background: bool,
    inbound_rx: Option<InboundReceiver>,
    cancel: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
}

/// Realtime when open, one-shot HTTP write otherwise.
struct Router {
    connection: Option<ConnectionManager>,
    polling: PollingAdapter,
}

impl UpdateSink for Router {
    fn send(&self, update: StateUpdate) {
        match &self.connection {
            Some(connection) if connection.is_open() => connection.send(update),
            _ => self.polling.send(update),
        }
    }
}

impl DeviceSync {
    /// Build the core. Does NOT connect; call [`start`](Self::start).
    pub fn new(config: SyncConfig) -> Result<Self, CoreError> {
        let client = DeviceClient::new(config.base_url.clone(), &config.transport_config())?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let connection = match config.transport {
            TransportMode::Realtime { .. } => Some(ConnectionManager::new(
                &config.base_url,
                config.secure_context,
                config.reconnect,
                inbound_tx.clone(),
                events.clone(),
            )?),
            TransportMode::Polling => None,
        };
        let polling = PollingAdapter::new(
            client.clone(),
            config.poll.active,
            inbound_tx.clone(),
            events.clone(),
        );

        let router = Router {
            connection: connection.clone(),
            polling: polling.clone(),
        };
        let coalescer = UpdateCoalescer::new(Arc::new(router), config.debounce);

        let (canonical, _) = watch::channel(None);
        let (effective, _) = watch::channel(None);
        let (info, _) = watch::channel(None);

        Ok(Self {
            inner: Arc::new(SyncInner {
                config,
                client,
                connection,
                polling,
                coalescer,
                inbound: inbound_tx,
                events,
                canonical,
                effective,
                info,
                zones: Mutex::new(Arc::new(Vec::new())),
                publish: Mutex::new(()),
                lifecycle: Mutex::new(Lifecycle {
                    phase: Phase::Idle,
                    background: false,
                    inbound_rx: Some(inbound_rx),
                    cancel: CancellationToken::new(),
                    task_handles: Vec::new(),
                }),
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the configured transport and start applying inbound state.
    ///
    /// Must be called from within a tokio runtime. A `DeviceSync` starts
    /// once; a second call returns [`CoreError::AlreadyStarted`].
    pub fn start(&self) -> Result<(), CoreError> {
        let mut lifecycle = self.inner.lifecycle();
        if lifecycle.phase != Phase::Idle {
            return Err(CoreError::AlreadyStarted);
        }
        let inbound_rx = lifecycle
            .inbound_rx
            .take()
            .ok_or_else(|| CoreError::Internal("inbound channel already taken".into()))?;
        lifecycle.phase = Phase::Running;

        let cancel = lifecycle.cancel.clone();
        lifecycle.task_handles.push(tokio::spawn(pump_task(
            Arc::downgrade(&self.inner),
            inbound_rx,
            cancel.clone(),
        )));

        match (&self.inner.connection, self.inner.config.transport) {
            (Some(connection), TransportMode::Realtime { fallback_to_polling }) => {
                if fallback_to_polling {
                    // Subscribe before connecting so no event is missed.
                    lifecycle.task_handles.push(tokio::spawn(fallback_task(
                        connection.clone(),
                        self.inner.polling.clone(),
                        self.inner.events.subscribe(),
                        connection.watch_status(),
                        self.inner.config.reconnect.max_attempts,
                        cancel,
                    )));
                }
                connection.connect();
            }
            _ => self.inner.polling.start(),
        }

        info!(url = %self.inner.config.base_url, "device sync started");
        Ok(())
    }

    /// Manually retry the realtime channel, e.g. after the reconnect
    /// budget ran out. No-op in polling mode.
    pub fn reconnect(&self) {
        if let Some(connection) = &self.inner.connection {
            connection.connect();
        }
    }

    /// Flush pending edits, cancel every timer, close the transports and
    /// wait for in-flight writes. Idempotent.
    pub async fn shutdown(&self) {
        let (cancel, handles) = {
            let mut lifecycle = self.inner.lifecycle();
            if lifecycle.phase == Phase::Stopped {
                return;
            }
            lifecycle.phase = Phase::Stopped;
            (
                lifecycle.cancel.clone(),
                std::mem::take(&mut lifecycle.task_handles),
            )
        };

        self.inner.coalescer.shutdown();

        if let Some(connection) = &self.inner.connection {
            connection.disconnect();
            connection.wait_closed().await;
        }
        self.inner.polling.stop();
        self.inner.polling.settle().await;

        cancel.cancel();
        for handle in handles {
            let _ = handle.await;
        }
        info!("device sync stopped");
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Queue a partial update. Applied to the effective state right away,
    /// sent after the debounce window.
    pub fn queue_update(&self, update: &StateUpdate) -> Result<(), CoreError> {
        self.ensure_running()?;
        self.inner.coalescer.queue_update(update);
        self.inner.republish_effective();
        Ok(())
    }

    /// Send anything pending now. Returns `true` if something was sent.
    pub fn flush(&self) -> Result<bool, CoreError> {
        self.ensure_running()?;
        Ok(self.inner.coalescer.flush())
    }

    /// One-shot pull over HTTP, applied as canonical state.
    ///
    /// While running, the snapshot takes its turn behind state the
    /// transports already delivered, so it may not be visible on return.
    pub async fn fetch_snapshot(&self) -> Result<StateSnapshot, CoreError> {
        let snapshot = self.inner.client.fetch_snapshot().await?;
        self.inner.deliver(InboundState {
            state: snapshot.state.clone(),
            info: Some(snapshot.info.clone()),
        });
        Ok(snapshot)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Effective state: canonical with local, unconfirmed edits on top.
    pub fn current(&self) -> Slot<DeviceState> {
        self.inner.effective.borrow().clone()
    }

    /// Last state pushed or returned by the device.
    pub fn canonical(&self) -> Slot<DeviceState> {
        self.inner.canonical.borrow().clone()
    }

    pub fn info(&self) -> Slot<DeviceInfo> {
        self.inner.info.borrow().clone()
    }

    /// Unflushed edits (for inspection).
    pub fn pending(&self) -> StateUpdate {
        self.inner.coalescer.pending()
    }

    /// Optimistic overlay over canonical state (for inspection).
    pub fn overlay(&self) -> StateUpdate {
        self.inner.coalescer.overlay()
    }

    pub fn subscribe_state(&self) -> StateStream<DeviceState> {
        StateStream::new(self.inner.effective.subscribe())
    }

    pub fn subscribe_canonical(&self) -> StateStream<DeviceState> {
        StateStream::new(self.inner.canonical.subscribe())
    }

    pub fn subscribe_info(&self) -> StateStream<DeviceInfo> {
        StateStream::new(self.inner.info.subscribe())
    }

    /// Status of whichever transport currently carries canonical state.
    pub fn status(&self) -> ConnectionStatus {
        match &self.inner.connection {
            Some(connection) if !self.inner.polling.is_running() => connection.status(),
            _ => self.inner.polling.status(),
        }
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    pub fn connection(&self) -> Option<&ConnectionManager> {
        self.inner.connection.as_ref()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.polling.is_running()
    }

    /// Passive monitoring polls at the background interval.
    pub fn set_background(&self, background: bool) {
        self.inner.lifecycle().background = background;
        let poll = self.inner.config.poll;
        self.inner
            .polling
            .set_interval(if background { poll.background } else { poll.active });
    }

    pub fn is_background(&self) -> bool {
        self.inner.lifecycle().background
    }

    // ── Zones ────────────────────────────────────────────────────────

    pub fn set_zones(&self, zones: Vec<ZoneDefinition>) {
        *self.inner.zones() = Arc::new(zones);
    }

    pub fn zones(&self) -> Arc<Vec<ZoneDefinition>> {
        let zones = self.inner.zones();
        Arc::clone(&*zones)
    }

    /// Labels for the segments of the effective state, keyed by id.
    pub fn labels(&self, max_len: Option<usize>) -> BTreeMap<u8, SegmentLabel> {
        let zones = self.zones();
        let state = self.current();
        let segments = state.as_deref().map_or(&[][..], |s| s.seg.as_slice());
        labels::label_all_with(segments, &zones, max_len)
    }

    pub fn match_statistics(&self) -> MatchStatistics {
        let zones = self.zones();
        let state = self.current();
        let segments = state.as_deref().map_or(&[][..], |s| s.seg.as_slice());
        labels::match_statistics(segments, &zones)
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        match self.inner.lifecycle().phase {
            Phase::Running => Ok(()),
            Phase::Idle | Phase::Stopped => Err(CoreError::NotStarted),
        }
    }
}

impl SyncInner {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn zones(&self) -> MutexGuard<'_, Arc<Vec<ZoneDefinition>>> {
        self.zones.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand inbound state to the pump while it runs; apply in place when
    /// there is no pump to order against.
    fn deliver(&self, inbound: InboundState) {
        let lifecycle = self.lifecycle();
        let inbound = match lifecycle.phase {
            Phase::Running => match self.inbound.send(inbound) {
                Ok(()) => return,
                Err(mpsc::error::SendError(inbound)) => inbound,
            },
            Phase::Idle | Phase::Stopped => inbound,
        };
        drop(lifecycle);
        self.apply_inbound(inbound);
    }

    fn apply_inbound(&self, inbound: InboundState) {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);

        let state = Arc::new(inbound.state);
        self.coalescer.on_canonical();
        let effective = Arc::new(self.coalescer.effective(&state));

        self.canonical.send_replace(Some(state));
        self.effective.send_replace(Some(effective));
        if let Some(info) = inbound.info {
            self.info.send_replace(Some(Arc::new(info)));
        }
    }

    fn republish_effective(&self) {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);

        let canonical = self.canonical.borrow().clone();
        if let Some(canonical) = canonical {
            let effective = self.coalescer.effective(&canonical);
            self.effective.send_replace(Some(Arc::new(effective)));
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Holds a weak handle so a dropped `DeviceSync` ends the pump.
async fn pump_task(inner: Weak<SyncInner>, mut inbound: InboundReceiver, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Settled writes may have answered just before cancellation.
                if let Some(inner) = inner.upgrade() {
                    while let Ok(pending) = inbound.try_recv() {
                        inner.apply_inbound(pending);
                    }
                }
                break;
            }
            received = inbound.recv() => {
                let (Some(state), Some(inner)) = (received, inner.upgrade()) else {
                    break;
                };
                inner.apply_inbound(state);
            }
        }
    }
    debug!("inbound pump exiting");
}

/// Starts polling once the realtime reconnect budget is spent and stops it
/// again when the channel comes back.
async fn fallback_task(
    connection: ConnectionManager,
    polling: PollingAdapter,
    mut events: broadcast::Receiver<ConnectionEvent>,
    mut status: watch::Receiver<ConnectionStatus>,
    max_attempts: u32,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(ConnectionEvent::ReconnectExhausted) => {
                    warn!("realtime channel unavailable, falling back to polling");
                    polling.start();
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "fallback supervisor lagged");
                    let exhausted = connection.status() == ConnectionStatus::Error
                        && connection.attempts() >= max_attempts
                        && !connection.has_pending_reconnect();
                    if exhausted {
                        polling.start();
                    }
                }
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let connected = *status.borrow_and_update() == ConnectionStatus::Connected;
                if connected && polling.is_running() {
                    info!("realtime channel restored, stopping polling");
                    polling.stop();
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
