//! Conformance test suite for `RecordStore` implementations.
//!
//! Checks any `RecordStore` backend against the same expectations:
//!
//! - **Reads**: empty kinds, store-native order, lookup by id
//! - **Writes**: id assignment, merge-on-update, delete, not-found errors
//! - **Validation**: shape enforcement, unknown kinds, stripped fields
//! - **Watch**: per-kind delivery, independent streams, guaranteed release
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test, validating against the shapes
//! it is handed:
//!
//! ```ignore
//! use testboard_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|shapes| async move {
//!         MemoryStore::new(shapes)
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod crud;
mod read;
mod validation;
mod watch;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use testboard_schema::{ActiveSchema, SchemaDefinition, ShapeProvider};

use crate::RecordStore;

/// Outcome of one check, named `category/check`.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub check: String,
    pub failure: Option<String>,
}

impl CheckOutcome {
    fn new(category: &str, name: &str, result: Result<(), String>) -> Self {
        CheckOutcome {
            check: format!("{}/{}", category, name),
            failure: result.err(),
        }
    }
}

/// Every outcome of one run. Displays a tally, then one line per failure.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub outcomes: Vec<CheckOutcome>,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}/{} store checks passed", self.total - self.failed, self.total)?;
        for outcome in &self.outcomes {
            if let Some(failure) = &outcome.failure {
                writeln!(f, "  {}: {}", outcome.check, failure)?;
            }
        }
        Ok(())
    }
}

/// The shapes every conformance test validates against.
///
/// `TestCase` carries a required name and the usual dashboard fields;
/// `Build` exists so tests can check kinds stay separate.
pub fn conformance_shapes() -> Arc<dyn ShapeProvider> {
    let definition: SchemaDefinition = serde_json::from_value(json!({
        "TestCase": {
            "name": { "type": "String", "required": true },
            "status": "String",
            "tags": ["String"],
            "duration": "Number",
            "createdAt": "Date"
        },
        "Build": {
            "number": "Number"
        },
        "Legacy": {
            "payload": "Mixed"
        }
    }))
    .unwrap_or_default();
    Arc::new(ActiveSchema::from_definition(definition))
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: RecordStore,
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    let mut outcomes = Vec::new();
    outcomes.extend(read::run_read_tests(&factory).await);
    outcomes.extend(crud::run_crud_tests(&factory).await);
    outcomes.extend(validation::run_validation_tests(&factory).await);
    outcomes.extend(watch::run_watch_tests(&factory).await);

    let failed = outcomes.iter().filter(|o| o.failure.is_some()).count();
    ConformanceReport {
        total: outcomes.len(),
        failed,
        outcomes,
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn fresh<S, F, Fut>(factory: &F) -> S
where
    F: Fn(Arc<dyn ShapeProvider>) -> Fut,
    Fut: Future<Output = S>,
{
    factory(conformance_shapes()).await
}

fn test_case(name: &str, status: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("name".to_string(), Value::String(name.to_string()));
    fields.insert("status".to_string(), Value::String(status.to_string()));
    fields
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
