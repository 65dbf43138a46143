// ── Realtime connection manager ──
//
// Owns the single realtime channel for one device endpoint: status state
// machine, bounded reconnect, inbound delivery and fire-and-forget sends.
//
// Each open attempt runs as one session task tagged with a generation.
// `connect()` and `disconnect()` bump the generation, so a session or
// reconnect timer that loses a race against them finds itself stale and
// backs off without touching status.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use ledsync_api::websocket::{RealtimeEvent, RealtimeSession, realtime_url};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::ReconnectPolicy;
use crate::error::CoreError;
use crate::model::{StateSnapshot, StateUpdate};
use crate::transport::{
    ConnectionEvent, ConnectionStatus, InboundSender, InboundState, StatusReporter, UpdateSink,
};

/// The realtime side of a device connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    url: Url,
    policy: ReconnectPolicy,
    inbound: InboundSender,
    reporter: StatusReporter,
    state: Mutex<ConnState>,
}

#[derive(Default)]
struct ConnState {
    attempts: u32,
    generation: u64,
    /// Present while a channel is opening or open.
    session: Option<SessionHandle>,
    reconnect: Option<JoinHandle<()>>,
    /// Session task still draining after `disconnect()`.
    closing: Option<JoinHandle<()>>,
}

struct SessionHandle {
    outbound: mpsc::UnboundedSender<StateUpdate>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

enum SessionEnd {
    Closed,
    Failed(String),
}

impl ConnectionManager {
    /// Build a manager for the device at `base_url`.
    ///
    /// The channel is `wss` whenever the base is `https` or the consumer
    /// runs in a `secure_context`.
    pub fn new(
        base_url: &Url,
        secure_context: bool,
        policy: ReconnectPolicy,
        inbound: InboundSender,
        events: broadcast::Sender<ConnectionEvent>,
    ) -> Result<Self, CoreError> {
        let url = realtime_url(base_url, secure_context)?;
        Ok(Self {
            inner: Arc::new(Inner {
                url,
                policy,
                inbound,
                reporter: StatusReporter::new(events),
                state: Mutex::new(ConnState::default()),
            }),
        })
    }

    /// Open the channel. No-op if one is already open or opening.
    ///
    /// A manual call starts a fresh reconnect budget.
    pub fn connect(&self) {
        let mut state = self.inner.lock();
        if state.session.is_some() {
            debug!("realtime channel already open or opening");
            return;
        }
        state.attempts = 0;
        self.inner.open(&mut state);
    }

    /// Cancel pending reconnects and close the channel. Idempotent.
    ///
    /// Updates already handed to [`send`](Self::send) are written before
    /// the close frame; await [`wait_closed`](Self::wait_closed) to know
    /// they are out.
    pub fn disconnect(&self) {
        let mut state = self.inner.lock();
        state.attempts = self.inner.policy.max_attempts;
        state.generation += 1;

        if let Some(timer) = state.reconnect.take() {
            timer.abort();
        }
        if let Some(session) = state.session.take() {
            info!(url = %self.inner.url, "Disconnecting realtime channel");
            session.cancel.cancel();
            state.closing = Some(session.task);
        }
        drop(state);

        if self.inner.reporter.set(ConnectionStatus::Disconnected) {
            self.inner.reporter.emit(ConnectionEvent::Disconnected);
        }
    }

    /// Wait for a session closed by [`disconnect`](Self::disconnect) to
    /// finish draining.
    pub async fn wait_closed(&self) {
        let task = self.inner.lock().closing.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(error = %e, "realtime session task panicked");
                }
            }
        }
    }

    /// Fire-and-forget. Silently dropped unless the channel is open.
    pub fn send(&self, update: StateUpdate) {
        if !self.is_open() {
            debug!("realtime channel not open, dropping update");
            return;
        }
        let state = self.inner.lock();
        if let Some(session) = &state.session {
            if session.outbound.send(update).is_err() {
                debug!("realtime session gone, dropping update");
            }
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.reporter.current()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.reporter.watch()
    }

    pub fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Failed attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner
            .lock()
            .reconnect
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// The derived realtime endpoint.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }
}

impl UpdateSink for ConnectionManager {
    fn send(&self, update: StateUpdate) {
        ConnectionManager::send(self, update);
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(self: &Arc<Self>, state: &mut ConnState) {
        if let Some(timer) = state.reconnect.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        self.reporter.set(ConnectionStatus::Connecting);

        let task = tokio::spawn(run_session(
            Arc::clone(self),
            generation,
            outbound_rx,
            cancel.clone(),
        ));
        state.session = Some(SessionHandle {
            outbound,
            cancel,
            task,
        });
    }

    /// Returns `false` when this session was superseded while opening.
    fn on_open(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.attempts = 0;
        drop(state);

        self.reporter.set(ConnectionStatus::Connected);
        self.reporter.emit(ConnectionEvent::Connected);
        true
    }

    fn deliver(&self, snapshot: StateSnapshot) {
        let inbound = InboundState {
            state: snapshot.state,
            info: Some(snapshot.info),
        };
        if self.inbound.send(inbound).is_err() {
            debug!("inbound consumer gone, dropping snapshot");
        }
    }

    fn on_session_end(self: &Arc<Self>, generation: u64, end: SessionEnd) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.session = None;

        match end {
            SessionEnd::Closed => {
                self.reporter.set(ConnectionStatus::Disconnected);
                self.reporter.emit(ConnectionEvent::Disconnected);
            }
            SessionEnd::Failed(message) => {
                warn!(url = %self.url, error = %message, attempt = state.attempts, "realtime channel error");
                self.reporter.set(ConnectionStatus::Error);
                self.reporter.emit(ConnectionEvent::Error(message));
            }
        }
        self.schedule_reconnect(&mut state);
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ConnState) {
        if let Some(timer) = state.reconnect.take() {
            timer.abort();
        }

        if state.attempts >= self.policy.max_attempts {
            error!(
                url = %self.url,
                attempts = state.attempts,
                "realtime reconnect budget exhausted"
            );
            self.reporter.set(ConnectionStatus::Error);
            self.reporter.emit(ConnectionEvent::ReconnectExhausted);
            return;
        }

        let delay = self.policy.delay_for(state.attempts);
        state.attempts += 1;
        info!(
            attempt = state.attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling realtime reconnect"
        );

        let weak = Arc::downgrade(self);
        let generation = state.generation;
        state.reconnect = Some(tokio::spawn(reconnect_after(weak, generation, delay)));
    }
}

async fn reconnect_after(inner: Weak<Inner>, generation: u64, delay: std::time::Duration) {
    tokio::time::sleep(delay).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut state = inner.lock();
    if state.generation != generation || state.session.is_some() {
        return;
    }
    // This task is the pending timer; detach rather than abort itself.
    state.reconnect = None;
    inner.open(&mut state);
}

// ── Session task ─────────────────────────────────────────────────────

async fn run_session(
    inner: Arc<Inner>,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<StateUpdate>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = RealtimeSession::open(&inner.url) => result,
    };

    let mut session = match opened {
        Ok(session) => session,
        Err(e) => {
            inner.on_session_end(generation, SessionEnd::Failed(e.to_string()));
            return;
        }
    };

    if !inner.on_open(generation) {
        session.close().await;
        return;
    }

    if let Err(e) = session.send(&StateUpdate::full_state_request()).await {
        inner.on_session_end(generation, SessionEnd::Failed(e.to_string()));
        return;
    }

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                drain(&mut session, &mut outbound).await;
                session.close().await;
                debug!("realtime session closed");
                return;
            }
            Some(update) = outbound.recv() => {
                if let Err(e) = session.send(&update).await {
                    inner.on_session_end(generation, SessionEnd::Failed(e.to_string()));
                    return;
                }
            }
            event = session.recv() => match event {
                Ok(RealtimeEvent::Snapshot(snapshot)) => inner.deliver(*snapshot),
                Ok(RealtimeEvent::Malformed(e)) => {
                    warn!(error = %e, "dropping malformed realtime message");
                }
                Ok(RealtimeEvent::Closed { code, reason }) => {
                    info!(?code, reason = %reason, "realtime channel closed by device");
                    inner.on_session_end(generation, SessionEnd::Closed);
                    return;
                }
                Err(e) => {
                    inner.on_session_end(generation, SessionEnd::Failed(e.to_string()));
                    return;
                }
            },
        }
    }
}

/// Write out everything queued before the close frame.
async fn drain(session: &mut RealtimeSession, outbound: &mut mpsc::UnboundedReceiver<StateUpdate>) {
    while let Ok(update) = outbound.try_recv() {
        if let Err(e) = session.send(&update).await {
            warn!(error = %e, "failed to drain queued update before close");
            return;
        }
    }
}
