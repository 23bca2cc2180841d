//! Write-path helpers shared by the backends.

use std::sync::Arc;

use serde_json::{Map, Value};
use testboard_interchange::Record;
use testboard_schema::{CompiledShape, ShapeProvider};

use crate::error::StorageError;

fn resolve_shape(shapes: &dyn ShapeProvider, kind: &str) -> Result<Arc<CompiledShape>, StorageError> {
    shapes.shape(kind).ok_or_else(|| StorageError::NoShape {
        kind: kind.to_string(),
    })
}

/// Conform `fields` and wrap them in a record with a fresh id.
pub(crate) fn new_record(
    shapes: &dyn ShapeProvider,
    kind: &str,
    fields: Map<String, Value>,
) -> Result<Record, StorageError> {
    let shape = resolve_shape(shapes, kind)?;
    let fields = shape.conform(fields)?;
    Ok(Record::new(uuid::Uuid::new_v4().simple().to_string(), fields))
}

/// Merge `patch` over `existing` and conform the result.
pub(crate) fn merged_record(
    shapes: &dyn ShapeProvider,
    kind: &str,
    existing: &Record,
    patch: Map<String, Value>,
) -> Result<Record, StorageError> {
    let shape = resolve_shape(shapes, kind)?;
    let mut merged = existing.fields.clone();
    for (key, value) in patch {
        merged.insert(key, value);
    }
    let fields = shape.conform(merged)?;
    Ok(Record::new(existing.id.clone(), fields))
}

pub(crate) fn not_found(kind: &str, id: &str) -> StorageError {
    StorageError::NotFound {
        kind: kind.to_string(),
        id: id.to_string(),
    }
}
