// ── Polling fallback ──
//
// Same consumer contract as the realtime channel, built from periodic
// `GET json/si` pulls. Writes go out as one-shot `POST json/state`
// requests whose answers feed the same inbound channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ledsync_api::DeviceClient;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::StateUpdate;
use crate::transport::{
    ConnectionEvent, ConnectionStatus, InboundSender, InboundState, StatusReporter, UpdateSink,
};

/// Pull-based transport for one device. Cheap to clone.
#[derive(Clone)]
pub struct PollingAdapter {
    inner: Arc<Inner>,
}

struct Inner {
    client: DeviceClient,
    inbound: InboundSender,
    reporter: StatusReporter,
    interval: watch::Sender<Duration>,
    state: Mutex<PollState>,
}

#[derive(Default)]
struct PollState {
    poller: Option<(CancellationToken, JoinHandle<()>)>,
    writes: JoinSet<()>,
}

impl PollingAdapter {
    pub fn new(
        client: DeviceClient,
        interval: Duration,
        inbound: InboundSender,
        events: broadcast::Sender<ConnectionEvent>,
    ) -> Self {
        let (interval, _) = watch::channel(interval);
        Self {
            inner: Arc::new(Inner {
                client,
                inbound,
                reporter: StatusReporter::new(events),
                interval,
                state: Mutex::new(PollState::default()),
            }),
        }
    }

    /// Start polling. The first pull happens immediately. No-op if running.
    pub fn start(&self) {
        let mut state = self.inner.lock();
        if state.poller.is_some() {
            return;
        }
        info!(url = %self.inner.client.base_url(), interval_ms = self.interval_ms(), "Starting polling");
        self.inner.reporter.set(ConnectionStatus::Connecting);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(Arc::clone(&self.inner), cancel.clone()));
        state.poller = Some((cancel, task));
    }

    /// Stop polling. In-flight writes keep running; see [`settle`](Self::settle).
    pub fn stop(&self) {
        let poller = self.inner.lock().poller.take();
        if let Some((cancel, _task)) = poller {
            info!("Stopping polling");
            cancel.cancel();
            self.inner.reporter.set(ConnectionStatus::Disconnected);
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().poller.is_some()
    }

    /// Change the poll period. A running poller pulls right away and then
    /// continues at the new rate.
    pub fn set_interval(&self, interval: Duration) {
        self.inner.interval.send_if_modified(|current| {
            if *current == interval {
                false
            } else {
                *current = interval;
                true
            }
        });
    }

    pub fn interval(&self) -> Duration {
        *self.inner.interval.borrow()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.reporter.current()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.reporter.watch()
    }

    /// One-shot write. The device's answer is delivered as canonical state.
    /// Must be called from within a tokio runtime.
    pub fn send(&self, update: StateUpdate) {
        let inner = Arc::clone(&self.inner);
        let mut state = self.inner.lock();
        // Reap finished writes so the set doesn't grow unbounded.
        while state.writes.try_join_next().is_some() {}
        state.writes.spawn(async move { inner.write(update).await });
    }

    /// Wait for every in-flight one-shot write to finish.
    pub async fn settle(&self) {
        let mut writes = std::mem::take(&mut self.inner.lock().writes);
        while writes.join_next().await.is_some() {}
    }

    fn interval_ms(&self) -> u64 {
        u64::try_from(self.interval().as_millis()).unwrap_or(u64::MAX)
    }
}

impl UpdateSink for PollingAdapter {
    fn send(&self, update: StateUpdate) {
        PollingAdapter::send(self, update);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll_once(&self) {
        match self.client.fetch_snapshot().await {
            Ok(snapshot) => {
                let inbound = InboundState {
                    state: snapshot.state,
                    info: Some(snapshot.info),
                };
                if self.inbound.send(inbound).is_err() {
                    debug!("inbound consumer gone, dropping polled snapshot");
                }
                if self.reporter.set(ConnectionStatus::Connected) {
                    self.reporter.emit(ConnectionEvent::Connected);
                }
            }
            Err(e) => {
                warn!(error = %e, "poll failed");
                self.reporter.set(ConnectionStatus::Error);
                self.reporter.emit(ConnectionEvent::Error(e.to_string()));
            }
        }
    }

    async fn write(&self, update: StateUpdate) {
        match self.client.post_state(&update).await {
            Ok(state) => {
                let inbound = InboundState { state, info: None };
                if self.inbound.send(inbound).is_err() {
                    debug!("inbound consumer gone, dropping write response");
                }
            }
            Err(e) => {
                warn!(error = %e, "one-shot state write failed");
                self.reporter.emit(ConnectionEvent::Error(e.to_string()));
            }
        }
    }
}

async fn poll_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut interval = inner.interval.subscribe();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = inner.poll_once() => {}
        }

        let period = *interval.borrow_and_update();
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = interval.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!("poll interval changed");
            }
            () = tokio::time::sleep(period) => {}
        }
    }
    debug!("poll loop exiting");
}
