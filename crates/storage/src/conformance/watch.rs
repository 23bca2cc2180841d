use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use testboard_schema::ShapeProvider;

use super::{fresh, test_case, CheckOutcome};
use crate::feed::{ChangeCause, ChangeStream};
use crate::{RecordStore, StorageError};

/// How long a test waits for an event that should arrive.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a test waits to be confident an event will not arrive.
const QUIET_PERIOD: Duration = Duration::from_millis(100);

pub(super) async fn run_watch_tests<S, F, Fut>(factory: &F) -> Vec<CheckOutcome>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckOutcome::new(
            "watch",
            "every_mutation_is_announced",
            every_mutation_is_announced(factory).await,
        ),
        CheckOutcome::new(
            "watch",
            "other_kinds_are_not_delivered",
            other_kinds_are_not_delivered(factory).await,
        ),
        CheckOutcome::new(
            "watch",
            "rejected_writes_are_not_announced",
            rejected_writes_are_not_announced(factory).await,
        ),
        CheckOutcome::new(
            "watch",
            "streams_are_independent",
            streams_are_independent(factory).await,
        ),
        CheckOutcome::new(
            "watch",
            "dropping_a_stream_releases_it",
            dropping_a_stream_releases_it(factory).await,
        ),
    ]
}

async fn expect_event(stream: &mut ChangeStream) -> Result<(), String> {
    match tokio::time::timeout(DELIVERY_TIMEOUT, stream.next()).await {
        Ok(Ok(event)) if event.kind == stream.kind() && event.cause == ChangeCause::Mutation => {
            Ok(())
        }
        Ok(Ok(event)) => Err(format!("unexpected event {:?}", event)),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("no change event delivered".into()),
    }
}

async fn expect_quiet(stream: &mut ChangeStream) -> Result<(), String> {
    match tokio::time::timeout(QUIET_PERIOD, stream.next()).await {
        Err(_) => Ok(()),
        Ok(result) => Err(format!("expected no event, got {:?}", result)),
    }
}

// ── Test implementations ──────────────────────────────────────────────────────

/// insert, update and delete each produce one event.
async fn every_mutation_is_announced<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let mut stream = s.watch("TestCase").await.map_err(|e| e.to_string())?;

    let r = s
        .insert("TestCase", test_case("login", "failed"))
        .await
        .map_err(|e| e.to_string())?;
    expect_event(&mut stream).await.map_err(|e| format!("insert: {}", e))?;

    s.update("TestCase", &r.id, test_case("login", "passed"))
        .await
        .map_err(|e| e.to_string())?;
    expect_event(&mut stream).await.map_err(|e| format!("update: {}", e))?;

    s.delete("TestCase", &r.id).await.map_err(|e| e.to_string())?;
    expect_event(&mut stream).await.map_err(|e| format!("delete: {}", e))?;
    Ok(())
}

async fn other_kinds_are_not_delivered<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let mut stream = s.watch("Build").await.map_err(|e| e.to_string())?;
    s.insert("TestCase", test_case("login", "failed"))
        .await
        .map_err(|e| e.to_string())?;
    expect_quiet(&mut stream).await
}

async fn rejected_writes_are_not_announced<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let mut stream = s.watch("TestCase").await.map_err(|e| e.to_string())?;
    let mut bad = test_case("login", "failed");
    bad.insert("duration".into(), serde_json::Value::Bool(true));
    match s.insert("TestCase", bad).await {
        Err(StorageError::Validation(_)) => {}
        other => return Err(format!("expected Validation error, got {:?}", other)),
    }
    expect_quiet(&mut stream).await
}

/// Two watchers of the same kind each get every event.
async fn streams_are_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let mut a = s.watch("TestCase").await.map_err(|e| e.to_string())?;
    let mut b = s.watch("TestCase").await.map_err(|e| e.to_string())?;
    s.insert("TestCase", test_case("login", "failed"))
        .await
        .map_err(|e| e.to_string())?;
    expect_event(&mut a).await.map_err(|e| format!("a: {}", e))?;
    drop(a);
    s.insert("TestCase", test_case("logout", "passed"))
        .await
        .map_err(|e| e.to_string())?;
    expect_event(&mut b).await.map_err(|e| format!("b first: {}", e))?;
    expect_event(&mut b).await.map_err(|e| format!("b second: {}", e))?;
    Ok(())
}

async fn dropping_a_stream_releases_it<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let s = fresh(factory).await;
    let before = s.active_watches();
    let stream = s.watch("TestCase").await.map_err(|e| e.to_string())?;
    if s.active_watches() != before + 1 {
        return Err(format!(
            "expected {} active watches, got {}",
            before + 1,
            s.active_watches()
        ));
    }
    stream.close();
    if s.active_watches() != before {
        return Err(format!(
            "expected {} active watches after close, got {}",
            before,
            s.active_watches()
        ));
    }
    Ok(())
}
