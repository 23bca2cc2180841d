use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};
use testboard_schema::ShapeProvider;

use super::{fields, fresh, test_case, CheckOutcome};
use crate::{RecordStore, StorageError};

pub(super) async fn run_validation_tests<S, F, Fut>(factory: &F) -> Vec<CheckOutcome>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckOutcome::new(
            "validation",
            "insert_rejects_wrong_primitive",
            insert_rejects_wrong_primitive(factory).await,
        ),
        CheckOutcome::new(
            "validation",
            "insert_rejects_missing_required_field",
            insert_rejects_missing_required_field(factory).await,
        ),
        CheckOutcome::new(
            "validation",
            "insert_strips_undeclared_fields",
            insert_strips_undeclared_fields(factory).await,
        ),
        CheckOutcome::new(
            "validation",
            "update_validates_merged_document",
            update_validates_merged_document(factory).await,
        ),
        CheckOutcome::new(
            "validation",
            "unknown_kind_has_no_shape",
            unknown_kind_has_no_shape(factory).await,
        ),
        CheckOutcome::new(
            "validation",
            "uncompiled_kind_has_no_shape",
            uncompiled_kind_has_no_shape(factory).await,
        ),
        CheckOutcome::new(
            "validation",
            "rejected_write_leaves_store_unchanged",
            rejected_write_leaves_store_unchanged(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn insert_rejects_wrong_primitive<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let doc = fields(json!({"name": "login", "duration": "fast", "tags": ["a", 1]}));
    match s.insert("TestCase", doc).await {
        Err(StorageError::Validation(e)) if e.violations.len() == 2 => Ok(()),
        other => Err(format!("expected two violations, got {:?}", other)),
    }
}

async fn insert_rejects_missing_required_field<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    match s.insert("TestCase", fields(json!({"status": "passed"}))).await {
        Err(StorageError::Validation(_)) => Ok(()),
        other => Err(format!("expected Validation error, got {:?}", other)),
    }
}

/// Fields outside the shape, and any caller-supplied `_id`, are dropped.
async fn insert_strips_undeclared_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let doc = fields(json!({"_id": "mine", "name": "login", "flaky": true}));
    let r = s.insert("TestCase", doc).await.map_err(|e| e.to_string())?;
    if r.id == "mine" {
        return Err("caller-supplied _id was accepted".into());
    }
    if Value::Object(r.fields.clone()) != json!({"name": "login"}) {
        return Err(format!("undeclared fields kept: {:?}", r.fields));
    }
    Ok(())
}

/// A patch that makes the merged record invalid is rejected.
async fn update_validates_merged_document<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let r = s
        .insert("TestCase", test_case("login", "passed"))
        .await
        .map_err(|e| e.to_string())?;
    match s.update("TestCase", &r.id, fields(json!({"name": null}))).await {
        Err(StorageError::Validation(_)) => {}
        other => return Err(format!("expected Validation error, got {:?}", other)),
    }
    let stored = s
        .find_by_id("TestCase", &r.id)
        .await
        .map_err(|e| e.to_string())?;
    if stored != r {
        return Err(format!("rejected update modified the record: {:?}", stored));
    }
    Ok(())
}

async fn unknown_kind_has_no_shape<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    match s.insert("Nope", test_case("x", "passed")).await {
        Err(StorageError::NoShape { kind }) if kind == "Nope" => Ok(()),
        other => Err(format!("expected NoShape, got {:?}", other)),
    }
}

/// A kind whose definition names an unknown type accepts no writes.
async fn uncompiled_kind_has_no_shape<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    match s.insert("Legacy", fields(json!({"payload": 1}))).await {
        Err(StorageError::NoShape { kind }) if kind == "Legacy" => Ok(()),
        other => Err(format!("expected NoShape, got {:?}", other)),
    }
}

async fn rejected_write_leaves_store_unchanged<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let _ = s
        .insert("TestCase", fields(json!({"name": 42})))
        .await;
    let records = s.find_all("TestCase").await.map_err(|e| e.to_string())?;
    if !records.is_empty() {
        return Err(format!("rejected insert was stored: {:?}", records));
    }
    Ok(())
}
