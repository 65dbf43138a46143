// ── Reactive state streams ──
//
// Subscription types for consuming canonical/effective state and device
// info from a `DeviceSync`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Shared slot for a value that is absent until the first snapshot.
pub type Slot<T> = Option<Arc<T>>;

/// A subscription to one device-level value.
///
/// Provides point-in-time access and change notification via
/// [`changed`](Self::changed) or by converting into a `Stream`.
pub struct StateStream<T: Send + Sync + 'static> {
    current: Slot<T>,
    receiver: watch::Receiver<Slot<T>>,
}

impl<T: Send + Sync + 'static> StateStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Slot<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The value captured at creation (or at the last `changed()`).
    pub fn current(&self) -> Option<&Arc<T>> {
        self.current.as_ref()
    }

    /// The latest value, which may be newer than [`current`](Self::current).
    pub fn latest(&self) -> Slot<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the owning `DeviceSync` is gone.
    pub async fn changed(&mut self) -> Option<Slot<T>> {
        self.receiver.changed().await.ok()?;
        let value = self.receiver.borrow_and_update().clone();
        self.current.clone_from(&value);
        Some(value)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> StateWatchStream<T> {
        StateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`. Yields the current
/// value first, then each new one.
pub struct StateWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Slot<T>>,
}

impl<T: Send + Sync + 'static> Stream for StateWatchStream<T> {
    type Item = Slot<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn changed_tracks_latest_value() {
        let (tx, rx) = watch::channel::<Slot<u8>>(None);
        let mut stream = StateStream::new(rx);
        assert!(stream.current().is_none());

        tx.send_replace(Some(Arc::new(7)));
        let value = stream.changed().await.unwrap();
        assert_eq!(value.as_deref(), Some(&7));
        assert_eq!(stream.current().map(|v| **v), Some(7));
    }

    #[tokio::test]
    async fn changed_ends_when_sender_dropped() {
        let (tx, rx) = watch::channel::<Slot<u8>>(None);
        let mut stream = StateStream::new(rx);
        drop(tx);
        assert!(stream.changed().await.is_none());
    }

    #[tokio::test]
    async fn into_stream_yields_current_then_updates() {
        let (tx, rx) = watch::channel::<Slot<u8>>(Some(Arc::new(1)));
        let mut stream = StateStream::new(rx).into_stream();

        assert_eq!(stream.next().await.unwrap().as_deref(), Some(&1));
        tx.send_replace(Some(Arc::new(2)));
        assert_eq!(stream.next().await.unwrap().as_deref(), Some(&2));
    }
}
