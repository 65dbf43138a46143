// ── Update coalescer ──
//
// Absorbs bursts of fine-grained edits (a dragged slider) into as few
// outbound writes as possible, while an optimistic overlay keeps the
// effective state current in the meantime.
//
// Two buffers, both built with `merge_update`:
//   pending  what has not been sent yet; cleared on flush
//   overlay  what the consumer should see over canonical state; cleared
//            only when canonical state arrives, then re-seeded from
//            whatever is still pending

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::merge::{merge_state, merge_update};
use crate::model::{DeviceState, StateUpdate};
use crate::transport::UpdateSink;

/// Debounced, merging outbound queue for one device.
#[derive(Clone)]
pub struct UpdateCoalescer {
    inner: Arc<Inner>,
}

struct Inner {
    sink: Arc<dyn UpdateSink>,
    debounce: Duration,
    buffers: Mutex<Buffers>,
}

#[derive(Default)]
struct Buffers {
    pending: StateUpdate,
    overlay: StateUpdate,
    timer: Option<JoinHandle<()>>,
}

impl UpdateCoalescer {
    pub fn new(sink: Arc<dyn UpdateSink>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                debounce,
                buffers: Mutex::new(Buffers::default()),
            }),
        }
    }

    /// Merge `update` into the pending buffer and the overlay, and restart
    /// the debounce window. Must be called from within a tokio runtime.
    pub fn queue_update(&self, update: &StateUpdate) {
        let mut buffers = self.inner.lock();
        buffers.pending = merge_update(&buffers.pending, update);
        buffers.overlay = merge_update(&buffers.overlay, update);

        if let Some(timer) = buffers.timer.take() {
            timer.abort();
        }
        buffers.timer = Some(spawn_timer(Arc::downgrade(&self.inner), self.inner.debounce));
        trace!("update queued");
    }

    /// Send whatever is pending now. Returns `true` if anything was sent.
    pub fn flush(&self) -> bool {
        self.inner.flush()
    }

    /// Fresh canonical state arrived: drop the overlay, keeping only edits
    /// that have not been flushed yet.
    pub fn on_canonical(&self) {
        let mut buffers = self.inner.lock();
        buffers.overlay = buffers.pending.clone();
    }

    /// Canonical state with the overlay applied.
    pub fn effective(&self, canonical: &DeviceState) -> DeviceState {
        merge_state(canonical, &self.inner.lock().overlay)
    }

    pub fn overlay(&self) -> StateUpdate {
        self.inner.lock().overlay.clone()
    }

    pub fn pending(&self) -> StateUpdate {
        self.inner.lock().pending.clone()
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.lock().pending.is_empty()
    }

    /// Flush and cancel the debounce timer. Teardown step; nothing queued
    /// before this call is lost.
    pub fn shutdown(&self) {
        self.inner.flush();
        if let Some(timer) = self.inner.lock().timer.take() {
            timer.abort();
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self) -> bool {
        let update = {
            let mut buffers = self.lock();
            if let Some(timer) = buffers.timer.take() {
                timer.abort();
            }
            std::mem::take(&mut buffers.pending)
        };

        if update.is_empty() {
            return false;
        }
        debug!(?update, "flushing coalesced update");
        self.sink.send(update);
        true
    }
}

/// The timer reads the buffer when it fires, never a copy taken now.
fn spawn_timer(inner: Weak<Inner>, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(inner) = inner.upgrade() {
            inner.flush();
        }
    })
}

// ── Tests ────────────────────────────────────────────────────────────
