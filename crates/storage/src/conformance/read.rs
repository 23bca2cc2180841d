use std::future::Future;
use std::sync::Arc;

use testboard_schema::ShapeProvider;

use super::{fresh, test_case, CheckOutcome};
use crate::{RecordStore, StorageError};

pub(super) async fn run_read_tests<S, F, Fut>(factory: &F) -> Vec<CheckOutcome>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckOutcome::new(
            "read",
            "find_all_on_empty_kind_is_empty",
            find_all_on_empty_kind_is_empty(factory).await,
        ),
        CheckOutcome::new(
            "read",
            "find_all_keeps_insertion_order",
            find_all_keeps_insertion_order(factory).await,
        ),
        CheckOutcome::new(
            "read",
            "find_all_is_scoped_to_kind",
            find_all_is_scoped_to_kind(factory).await,
        ),
        CheckOutcome::new(
            "read",
            "find_by_id_returns_stored_record",
            find_by_id_returns_stored_record(factory).await,
        ),
        CheckOutcome::new(
            "read",
            "find_by_id_missing_is_not_found",
            find_by_id_missing_is_not_found(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

/// A kind with no records reads as an empty sequence, not an error.
async fn find_all_on_empty_kind_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let records = s.find_all("TestCase").await.map_err(|e| e.to_string())?;
    if !records.is_empty() {
        return Err(format!("expected no records, got {}", records.len()));
    }
    Ok(())
}

/// Records come back in the order they were inserted.
async fn find_all_keeps_insertion_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    for name in ["first", "second", "third"] {
        s.insert("TestCase", test_case(name, "passed"))
            .await
            .map_err(|e| e.to_string())?;
    }
    let names: Vec<String> = s
        .find_all("TestCase")
        .await
        .map_err(|e| e.to_string())?
        .iter()
        .filter_map(|r| r.fields.get("name").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    if names != ["first", "second", "third"] {
        return Err(format!("unexpected order: {:?}", names));
    }
    Ok(())
}

/// Records of one kind never appear in another kind's read.
async fn find_all_is_scoped_to_kind<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    s.insert("TestCase", test_case("login", "failed"))
        .await
        .map_err(|e| e.to_string())?;
    let builds = s.find_all("Build").await.map_err(|e| e.to_string())?;
    if !builds.is_empty() {
        return Err(format!("expected no Build records, got {}", builds.len()));
    }
    Ok(())
}

/// find_by_id returns exactly what insert returned.
async fn find_by_id_returns_stored_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let inserted = s
        .insert("TestCase", test_case("login", "passed"))
        .await
        .map_err(|e| e.to_string())?;
    let found = s
        .find_by_id("TestCase", &inserted.id)
        .await
        .map_err(|e| e.to_string())?;
    if found != inserted {
        return Err(format!("expected {:?}, got {:?}", inserted, found));
    }
    Ok(())
}

/// Looking up an unknown id is NotFound.
async fn find_by_id_missing_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    match s.find_by_id("TestCase", "nope").await {
        Err(StorageError::NotFound { kind, id }) if kind == "TestCase" && id == "nope" => Ok(()),
        other => Err(format!("expected NotFound, got {:?}", other)),
    }
}
