//! A memory store whose reads and watches can be made to fail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use testboard_interchange::Record;
use testboard_storage::conformance::conformance_shapes;
use testboard_storage::{ChangeStream, MemoryStore, RecordStore, StorageError};

use super::watcher::ReconnectPolicy;

pub(crate) fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        max_attempts: 3,
    }
}

pub(crate) struct FlakyStore {
    pub(crate) inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_watches: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        FlakyStore {
            inner: MemoryStore::new(conformance_shapes()),
            fail_reads: AtomicBool::new(false),
            fail_watches: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_watches(&self, fail: bool) {
        self.fail_watches.store(fail, Ordering::SeqCst);
    }

    pub(crate) async fn insert_case(&self, name: &str, status: &str) -> Record {
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(name.into()));
        fields.insert("status".into(), Value::String(status.into()));
        self.inner.insert("TestCase", fields).await.unwrap()
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn find_all(&self, kind: &str) -> Result<Vec<Record>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Read {
                kind: kind.to_string(),
                message: "injected read failure".into(),
            });
        }
        self.inner.find_all(kind).await
    }

    async fn insert(&self, kind: &str, fields: Map<String, Value>) -> Result<Record, StorageError> {
        self.inner.insert(kind, fields).await
    }

    async fn update(
        &self,
        kind: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, StorageError> {
        self.inner.update(kind, id, fields).await
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<(), StorageError> {
        self.inner.delete(kind, id).await
    }

    async fn watch(&self, kind: &str) -> Result<ChangeStream, StorageError> {
        if self.fail_watches.load(Ordering::SeqCst) {
            return Err(StorageError::StreamBroken {
                kind: kind.to_string(),
            });
        }
        self.inner.watch(kind).await
    }

    fn active_watches(&self) -> usize {
        self.inner.active_watches()
    }
}
