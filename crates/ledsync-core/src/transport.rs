// ── Transport seam ──
//
// The coalescer flushes into an `UpdateSink`; both transports push
// canonical state into one ordered inbound channel and report lifecycle
// changes as `ConnectionEvent`s.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};

use crate::model::{DeviceInfo, DeviceState, StateUpdate};

/// Lifecycle of the channel carrying canonical state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

/// Notifications alongside the status value, for consumers that toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Error(String),
    /// The automatic reconnect budget is spent; only a manual
    /// `connect()` will try again.
    ReconnectExhausted,
}

/// Authoritative state from the device.
///
/// `info` is `None` when the state came back from a one-shot write, which
/// answers with state only.
#[derive(Debug, Clone)]
pub struct InboundState {
    pub state: DeviceState,
    pub info: Option<DeviceInfo>,
}

pub type InboundSender = mpsc::UnboundedSender<InboundState>;
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundState>;

/// Where coalesced updates go. Fire-and-forget: failures surface as
/// status and events, never to the caller.
pub trait UpdateSink: Send + Sync {
    fn send(&self, update: StateUpdate);
}

// ── Shared status plumbing ───────────────────────────────────────────

/// Status watch + event broadcast, shared by both transports.
#[derive(Debug, Clone)]
pub(crate) struct StatusReporter {
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl StatusReporter {
    pub(crate) fn new(events: broadcast::Sender<ConnectionEvent>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self { status, events }
    }

    pub(crate) fn current(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Returns `true` if the status actually changed.
    pub(crate) fn set(&self, next: ConnectionStatus) -> bool {
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
