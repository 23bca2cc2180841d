//! Per-subscriber broadcast session: every change event becomes one full
//! snapshot pushed to that subscriber only.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use testboard_interchange::{ServerFrame, SnapshotMessage};
use testboard_schema::ActiveSchema;
use testboard_storage::{RecordStore, StorageError};
use tokio::sync::watch;

use super::watcher::{ChangeWatcher, WatchError};

/// The subscriber went away while a frame was being delivered.
#[derive(Debug)]
pub(crate) struct SinkClosed;

/// Where a session's frames go. Frames arrive in the order they are pushed.
#[async_trait]
pub(crate) trait SnapshotSink: Send {
    async fn push(&mut self, frame: ServerFrame) -> Result<(), SinkClosed>;
}

/// Why a session ended.
#[derive(Debug)]
pub(crate) enum SessionEnd {
    Disconnected,
    Degraded(WatchError),
}

/// Builds snapshots of one kind against the live schema.
pub(crate) struct BroadcastSession {
    store: Arc<dyn RecordStore>,
    schema: watch::Receiver<Arc<ActiveSchema>>,
    kind: String,
}

impl BroadcastSession {
    pub(crate) fn new(
        store: Arc<dyn RecordStore>,
        schema: watch::Receiver<Arc<ActiveSchema>>,
        kind: impl Into<String>,
    ) -> Self {
        BroadcastSession {
            store,
            schema,
            kind: kind.into(),
        }
    }

    /// Every current record of the kind plus its source entry in the
    /// active definition.
    pub(crate) async fn build_snapshot(&self) -> Result<ServerFrame, StorageError> {
        let test_cases = self.store.find_all(&self.kind).await?;
        let schema = self.schema.borrow().served_fields(&self.kind).cloned();
        Ok(ServerFrame::Snapshot(SnapshotMessage { test_cases, schema }))
    }
}

/// Wait for the next event and build its snapshot. `Ok(None)` means the
/// read failed and this push is skipped.
async fn next_push(
    watcher: &mut ChangeWatcher,
    session: &BroadcastSession,
) -> Result<Option<ServerFrame>, WatchError> {
    let event = watcher.next().await?;
    match session.build_snapshot().await {
        Ok(frame) => Ok(Some(frame)),
        Err(e) => {
            tracing::error!(
                kind = %session.kind,
                cause = ?event.cause,
                error = %e,
                "snapshot read failed, skipping push"
            );
            Ok(None)
        }
    }
}

/// Drive one subscriber until it disconnects or its feed degrades.
///
/// The watcher is closed on every exit path, so its change stream is
/// released exactly once and nothing is pushed afterwards.
pub(crate) async fn run_session<S, D>(
    mut watcher: ChangeWatcher,
    session: &BroadcastSession,
    sink: &mut S,
    disconnected: D,
) -> SessionEnd
where
    S: SnapshotSink,
    D: Future<Output = ()>,
{
    tokio::pin!(disconnected);
    let end = loop {
        let step = tokio::select! {
            biased;
            _ = &mut disconnected => None,
            step = next_push(&mut watcher, session) => Some(step),
        };
        match step {
            None => break SessionEnd::Disconnected,
            Some(Ok(Some(frame))) => {
                if sink.push(frame).await.is_err() {
                    break SessionEnd::Disconnected;
                }
            }
            Some(Ok(None)) => {}
            Some(Err(e)) => break SessionEnd::Degraded(e),
        }
    };
    watcher.close();
    tracing::debug!(kind = %session.kind, end = ?end, "session ended");
    end
}
