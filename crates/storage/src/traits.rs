use async_trait::async_trait;
use serde_json::{Map, Value};
use testboard_interchange::Record;

use crate::error::StorageError;
use crate::feed::ChangeStream;

/// The CRUD + change-notification boundary over a persistence engine.
///
/// ## Shapes
///
/// Every write resolves the kind's compiled shape once, when it starts,
/// and validates against that shape only. A schema reload therefore never
/// changes the shape under an in-flight write, and no write that starts
/// after a reload sees the old shape.
///
/// ## Change feed
///
/// `watch` hands out an independent [`ChangeStream`] per call. Streams are
/// released when dropped. A broken feed yields `StreamBroken`; re-establish
/// it by calling `watch` again.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared across
/// connection tasks as `Arc<dyn RecordStore>`.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// All records of `kind` in store-native order. Unknown kinds are empty.
    async fn find_all(&self, kind: &str) -> Result<Vec<Record>, StorageError>;

    /// One record by id.
    ///
    /// Returns `Err(StorageError::NotFound)` if it does not exist.
    async fn find_by_id(&self, kind: &str, id: &str) -> Result<Record, StorageError> {
        self.find_all(kind)
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| StorageError::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            })
    }

    /// Validate `fields`, assign an id, store, and announce the change.
    async fn insert(&self, kind: &str, fields: Map<String, Value>) -> Result<Record, StorageError>;

    /// Merge `fields` over the stored record, re-validate the result, store,
    /// and announce the change. A `null` value removes the field.
    async fn update(
        &self,
        kind: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, StorageError>;

    /// Remove a record and announce the change.
    async fn delete(&self, kind: &str, id: &str) -> Result<(), StorageError>;

    /// Open a change stream for `kind`.
    async fn watch(&self, kind: &str) -> Result<ChangeStream, StorageError>;

    /// Change streams currently held by consumers.
    fn active_watches(&self) -> usize;
}
