//! Change feeds: "the records of kind K changed" signals.
//!
//! A feed is a broadcast channel shared by every stream a store hands out.
//! Events carry no payload beyond the kind; consumers re-fetch. Each
//! [`ChangeStream`] holds a release guard, so dropping the stream (on any
//! path) releases its subscription exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::StorageError;

/// Buffered events per feed before a slow stream lags.
const FEED_CAPACITY: usize = 256;

/// Why a change event was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    /// Synthetic event emitted when a watch starts.
    Initial,
    /// A write was observed.
    Mutation,
    /// Events may have been missed (lag, feed re-established).
    Resync,
}

/// Opaque signal that the record set of `kind` was mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: String,
    pub cause: ChangeCause,
}

impl ChangeEvent {
    pub fn new(kind: impl Into<String>, cause: ChangeCause) -> Self {
        ChangeEvent {
            kind: kind.into(),
            cause,
        }
    }
}

/// The broadcast hub behind a store's `watch`.
pub struct ChangeFeed {
    sender: Mutex<broadcast::Sender<ChangeEvent>>,
    active: Arc<AtomicUsize>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        ChangeFeed {
            sender: Mutex::new(sender),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Announce a mutation of `kind`. A no-op when nobody is watching.
    pub fn publish(&self, kind: &str) {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let _ = sender.send(ChangeEvent::new(kind, ChangeCause::Mutation));
    }

    /// Open a stream of events for `kind`.
    pub fn subscribe(&self, kind: &str) -> ChangeStream {
        let rx = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .subscribe();
        self.active.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(kind, "change feed acquired");
        ChangeStream {
            kind: kind.to_string(),
            rx,
            _guard: WatchGuard {
                active: Arc::clone(&self.active),
                kind: kind.to_string(),
            },
        }
    }

    /// End every open stream: each observes `StreamBroken` once its
    /// buffered events are drained. Later subscriptions attach to a fresh
    /// channel.
    pub fn break_streams(&self) {
        let (fresh, _) = broadcast::channel(FEED_CAPACITY);
        let old = std::mem::replace(
            &mut *self.sender.lock().unwrap_or_else(|e| e.into_inner()),
            fresh,
        );
        drop(old);
    }

    /// Streams currently held by consumers.
    pub fn active_watches(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct WatchGuard {
    active: Arc<AtomicUsize>,
    kind: String,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(kind = %self.kind, "change feed released");
    }
}

/// A live, non-restartable sequence of change events for one kind.
pub struct ChangeStream {
    kind: String,
    rx: broadcast::Receiver<ChangeEvent>,
    _guard: WatchGuard,
}

impl ChangeStream {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Wait for the next event for this stream's kind.
    ///
    /// A stream that fell behind gets one `Resync` event in place of the
    /// events it missed. `StreamBroken` is terminal.
    pub async fn next(&mut self) -> Result<ChangeEvent, StorageError> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.kind == self.kind => return Ok(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(kind = %self.kind, missed, "change stream lagged, coalescing");
                    return Ok(ChangeEvent::new(self.kind.clone(), ChangeCause::Resync));
                }
                Err(RecvError::Closed) => {
                    return Err(StorageError::StreamBroken {
                        kind: self.kind.clone(),
                    })
                }
            }
        }
    }

    /// Release the stream. Equivalent to dropping it.
    pub fn close(self) {}
}
