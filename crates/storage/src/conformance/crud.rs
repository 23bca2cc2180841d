use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};
use testboard_schema::ShapeProvider;

use super::{fields, fresh, test_case, CheckOutcome};
use crate::{RecordStore, StorageError};

pub(super) async fn run_crud_tests<S, F, Fut>(factory: &F) -> Vec<CheckOutcome>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckOutcome::new(
            "crud",
            "insert_assigns_unique_ids",
            insert_assigns_unique_ids(factory).await,
        ),
        CheckOutcome::new(
            "crud",
            "update_merges_fields",
            update_merges_fields(factory).await,
        ),
        CheckOutcome::new(
            "crud",
            "update_with_null_removes_field",
            update_with_null_removes_field(factory).await,
        ),
        CheckOutcome::new(
            "crud",
            "update_missing_is_not_found",
            update_missing_is_not_found(factory).await,
        ),
        CheckOutcome::new(
            "crud",
            "delete_removes_record",
            delete_removes_record(factory).await,
        ),
        CheckOutcome::new(
            "crud",
            "delete_missing_is_not_found",
            delete_missing_is_not_found(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

/// Every insert gets a distinct, non-empty id.
async fn insert_assigns_unique_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let mut ids = HashSet::new();
    for i in 0..10 {
        let r = s
            .insert("TestCase", test_case(&format!("case-{}", i), "passed"))
            .await
            .map_err(|e| e.to_string())?;
        if r.id.is_empty() {
            return Err("insert returned an empty id".into());
        }
        ids.insert(r.id);
    }
    if ids.len() != 10 {
        return Err(format!("expected 10 distinct ids, got {}", ids.len()));
    }
    Ok(())
}

/// update overwrites the given fields and keeps the rest.
async fn update_merges_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let r = s
        .insert("TestCase", test_case("login", "failed"))
        .await
        .map_err(|e| e.to_string())?;
    let updated = s
        .update("TestCase", &r.id, fields(json!({"status": "passed", "duration": 12})))
        .await
        .map_err(|e| e.to_string())?;
    let stored = s
        .find_by_id("TestCase", &r.id)
        .await
        .map_err(|e| e.to_string())?;
    if stored != updated {
        return Err(format!("update returned {:?} but store has {:?}", updated, stored));
    }
    let expected = json!({"name": "login", "status": "passed", "duration": 12});
    if Value::Object(stored.fields.clone()) != expected {
        return Err(format!("expected {}, got {:?}", expected, stored.fields));
    }
    if stored.id != r.id {
        return Err("update changed the record id".into());
    }
    Ok(())
}

/// A null in an update unsets the field.
async fn update_with_null_removes_field<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let r = s
        .insert("TestCase", test_case("login", "failed"))
        .await
        .map_err(|e| e.to_string())?;
    let updated = s
        .update("TestCase", &r.id, fields(json!({"status": null})))
        .await
        .map_err(|e| e.to_string())?;
    if updated.fields.contains_key("status") {
        return Err(format!("status should be gone: {:?}", updated.fields));
    }
    Ok(())
}

async fn update_missing_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    match s.update("TestCase", "nope", test_case("x", "passed")).await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!("expected NotFound, got {:?}", other)),
    }
}

/// delete removes exactly the named record.
async fn delete_removes_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let a = s
        .insert("TestCase", test_case("a", "passed"))
        .await
        .map_err(|e| e.to_string())?;
    let b = s
        .insert("TestCase", test_case("b", "passed"))
        .await
        .map_err(|e| e.to_string())?;
    s.delete("TestCase", &a.id).await.map_err(|e| e.to_string())?;
    let remaining = s.find_all("TestCase").await.map_err(|e| e.to_string())?;
    if remaining != vec![b] {
        return Err(format!("expected only b to remain, got {:?}", remaining));
    }
    Ok(())
}

async fn delete_missing_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    match s.delete("TestCase", "nope").await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!("expected NotFound, got {:?}", other)),
    }
}
