use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use testboard_interchange::Record;
use testboard_schema::ShapeProvider;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::feed::{ChangeFeed, ChangeStream};
use crate::traits::RecordStore;
use crate::write::{merged_record, new_record, not_found};

/// In-process record store. Records keep insertion order.
pub struct MemoryStore {
    shapes: Arc<dyn ShapeProvider>,
    collections: RwLock<HashMap<String, Vec<Record>>>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new(shapes: Arc<dyn ShapeProvider>) -> Self {
        MemoryStore {
            shapes,
            collections: RwLock::new(HashMap::new()),
            feed: ChangeFeed::new(),
        }
    }

    /// Close every open change stream; later `watch` calls get a fresh feed.
    pub fn reset_change_feed(&self) {
        tracing::warn!("memory store change feed reset");
        self.feed.break_streams();
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_all(&self, kind: &str) -> Result<Vec<Record>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections.get(kind).cloned().unwrap_or_default())
    }

    async fn insert(&self, kind: &str, fields: Map<String, Value>) -> Result<Record, StorageError> {
        let record = new_record(self.shapes.as_ref(), kind, fields)?;
        self.collections
            .write()
            .await
            .entry(kind.to_string())
            .or_default()
            .push(record.clone());
        self.feed.publish(kind);
        Ok(record)
    }

    async fn update(
        &self,
        kind: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, StorageError> {
        let mut collections = self.collections.write().await;
        let slot = collections
            .get_mut(kind)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| not_found(kind, id))?;
        let updated = merged_record(self.shapes.as_ref(), kind, slot, fields)?;
        *slot = updated.clone();
        drop(collections);
        self.feed.publish(kind);
        Ok(updated)
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<(), StorageError> {
        let mut collections = self.collections.write().await;
        let records = collections
            .get_mut(kind)
            .ok_or_else(|| not_found(kind, id))?;
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| not_found(kind, id))?;
        records.remove(index);
        drop(collections);
        self.feed.publish(kind);
        Ok(())
    }

    async fn watch(&self, kind: &str) -> Result<ChangeStream, StorageError> {
        Ok(self.feed.subscribe(kind))
    }

    fn active_watches(&self) -> usize {
        self.feed.active_watches()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::{conformance_shapes, run_conformance_suite};

    #[tokio::test]
    async fn memory_store_conformance() {
        let report = run_conformance_suite(|shapes| async move { MemoryStore::new(shapes) }).await;
        assert!(report.failed == 0, "{report}");
        assert!(report.total > 0);
    }

    #[tokio::test]
    async fn writes_follow_the_registry_after_a_reload() {
        use serde_json::json;
        use testboard_schema::SchemaRegistry;

        let schema = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(schema.path(), r#"{"TestCase": {"name": "String"}}"#).unwrap();
        let registry = Arc::new(SchemaRegistry::open(schema.path()).await.unwrap());
        let store = MemoryStore::new(registry.clone());
        let doc = |v: Value| v.as_object().cloned().unwrap();

        store
            .insert("TestCase", doc(json!({"name": "login"})))
            .await
            .unwrap();

        std::fs::write(schema.path(), r#"{"TestCase": {"name": "Number"}}"#).unwrap();
        registry.reload().await.unwrap();

        let rejected = store.insert("TestCase", doc(json!({"name": "login"}))).await;
        assert!(matches!(rejected, Err(StorageError::Validation(_))));
        let accepted = store
            .insert("TestCase", doc(json!({"name": 42})))
            .await
            .unwrap();
        assert_eq!(accepted.fields.get("name"), Some(&json!(42)));
        assert_eq!(store.find_all("TestCase").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reset_breaks_open_streams() {
        let store = MemoryStore::new(conformance_shapes());
        let mut stream = store.watch("TestCase").await.unwrap();
        store.reset_change_feed();
        assert!(matches!(
            stream.next().await,
            Err(StorageError::StreamBroken { .. })
        ));
    }
}
