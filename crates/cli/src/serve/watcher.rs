//! Per-connection change watcher: `Idle -> Watching -> Closed`.

use std::sync::Arc;
use std::time::Duration;

use testboard_storage::{ChangeCause, ChangeEvent, ChangeStream, RecordStore, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum WatchError {
    /// The feed could not be re-established; the connection is degraded.
    #[error("change feed for '{kind}' unavailable after {attempts} attempts: {source}")]
    Degraded {
        kind: String,
        attempts: u32,
        #[source]
        source: StorageError,
    },
    #[error("watcher is closed")]
    Closed,
}

/// Backoff for re-establishing a broken change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReconnectPolicy {
    pub(crate) initial_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (0-based): doubling, capped.
    pub(crate) fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatcherState {
    Idle,
    Watching,
    Closed,
}

/// Forwards one kind's change events to a single subscriber, starting with
/// a synthetic initial event. Owns its stream exclusively; closing or
/// dropping the watcher releases it.
pub(crate) struct ChangeWatcher {
    store: Arc<dyn RecordStore>,
    kind: String,
    policy: ReconnectPolicy,
    state: WatcherState,
    stream: Option<ChangeStream>,
    initial_pending: bool,
}

impl ChangeWatcher {
    pub(crate) fn new(store: Arc<dyn RecordStore>, kind: impl Into<String>, policy: ReconnectPolicy) -> Self {
        ChangeWatcher {
            store,
            kind: kind.into(),
            policy,
            state: WatcherState::Idle,
            stream: None,
            initial_pending: false,
        }
    }

    pub(crate) fn state(&self) -> WatcherState {
        self.state
    }

    /// Acquire the change stream and queue the initial event.
    pub(crate) async fn start(&mut self) -> Result<(), WatchError> {
        match self.state {
            WatcherState::Closed => return Err(WatchError::Closed),
            WatcherState::Watching => return Ok(()),
            WatcherState::Idle => {}
        }
        match self.store.watch(&self.kind).await {
            Ok(stream) => self.stream = Some(stream),
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "initial watch failed, retrying");
                self.reconnect().await?;
            }
        }
        self.state = WatcherState::Watching;
        self.initial_pending = true;
        Ok(())
    }

    /// The next change event. Starts the watcher if it is idle.
    ///
    /// A broken stream is re-established under the reconnect policy and
    /// reported as a `Resync` event, since changes may have been missed.
    /// Exhausting the policy closes the watcher with `Degraded`.
    pub(crate) async fn next(&mut self) -> Result<ChangeEvent, WatchError> {
        if self.state == WatcherState::Idle {
            self.start().await?;
        }
        if self.state == WatcherState::Closed {
            return Err(WatchError::Closed);
        }
        if self.initial_pending {
            self.initial_pending = false;
            return Ok(ChangeEvent::new(self.kind.clone(), ChangeCause::Initial));
        }
        let result = match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => Err(StorageError::StreamBroken {
                kind: self.kind.clone(),
            }),
        };
        match result {
            Ok(event) => Ok(event),
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "change stream broke, reconnecting");
                self.stream = None;
                self.reconnect().await?;
                Ok(ChangeEvent::new(self.kind.clone(), ChangeCause::Resync))
            }
        }
    }

    async fn reconnect(&mut self) -> Result<(), WatchError> {
        let mut last_error = StorageError::StreamBroken {
            kind: self.kind.clone(),
        };
        for attempt in 0..self.policy.max_attempts {
            tokio::time::sleep(self.policy.delay(attempt)).await;
            match self.store.watch(&self.kind).await {
                Ok(stream) => {
                    tracing::info!(kind = %self.kind, attempt = attempt + 1, "change feed re-established");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(kind = %self.kind, attempt = attempt + 1, error = %e, "watch attempt failed");
                    last_error = e;
                }
            }
        }
        self.close();
        Err(WatchError::Degraded {
            kind: self.kind.clone(),
            attempts: self.policy.max_attempts,
            source: last_error,
        })
    }

    /// Release the stream. Idempotent.
    pub(crate) fn close(&mut self) {
        self.state = WatcherState::Closed;
        self.initial_pending = false;
        self.stream = None;
    }
}
