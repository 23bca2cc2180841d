//! The schema registry: owns the active definition and its compiled shapes.
//!
//! The active pair lives behind a `tokio::sync::watch` channel. Readers
//! take an immutable `Arc<ActiveSchema>` snapshot; a reload builds a
//! complete new snapshot and swaps it in one step, so no reader ever sees a
//! definition paired with shapes from another generation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::compile::{compile, CompiledShape};
use crate::error::{SchemaLoadError, UnknownTypeError};
use crate::types::{FieldSet, SchemaDefinition};

/// Resolves the shape that writes to a kind must satisfy right now.
///
/// Implemented by [`SchemaRegistry`] (current generation) and by
/// [`ActiveSchema`] (a fixed snapshot).
pub trait ShapeProvider: Send + Sync {
    fn shape(&self, kind: &str) -> Option<Arc<CompiledShape>>;
}

/// One generation of the schema: the definition and everything compiled from it.
#[derive(Debug)]
pub struct ActiveSchema {
    generation: u64,
    definition: Arc<SchemaDefinition>,
    /// Each kind's entry exactly as written in the source.
    entries: Map<String, Value>,
    shapes: HashMap<String, Arc<CompiledShape>>,
    failures: Vec<UnknownTypeError>,
    retained: Vec<String>,
}

impl ActiveSchema {
    /// Compile `definition` into a standalone snapshot (generation 0).
    pub fn from_definition(definition: SchemaDefinition) -> Self {
        let entries = match serde_json::to_value(&definition) {
            Ok(Value::Object(entries)) => entries,
            _ => Map::new(),
        };
        Self::build(0, definition, entries, None)
    }

    /// Compile a new generation. A kind that fails to compile but had a
    /// shape in `previous` keeps its previous fields, entry and shape.
    fn build(
        generation: u64,
        mut definition: SchemaDefinition,
        mut entries: Map<String, Value>,
        previous: Option<&ActiveSchema>,
    ) -> Self {
        let compiled = compile(&definition);
        let mut shapes = compiled.shapes;
        let mut retained = Vec::new();
        if let Some(previous) = previous {
            for failure in &compiled.failures {
                let kind = failure.kind.as_str();
                let (Some(shape), Some(fields)) =
                    (previous.shapes.get(kind), previous.definition.kind(kind))
                else {
                    continue;
                };
                definition.replace(kind, fields.clone());
                if let Some(entry) = previous.entries.get(kind) {
                    entries.insert(kind.to_string(), entry.clone());
                }
                shapes.insert(kind.to_string(), Arc::clone(shape));
                retained.push(kind.to_string());
            }
        }
        ActiveSchema {
            generation,
            definition: Arc::new(definition),
            entries,
            shapes,
            failures: compiled.failures,
            retained,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn definition(&self) -> &Arc<SchemaDefinition> {
        &self.definition
    }

    /// The parsed fields of `kind`.
    pub fn fields(&self, kind: &str) -> Option<&FieldSet> {
        self.definition.kind(kind)
    }

    /// The source entry of `kind` as sent to viewers. Only kinds that have
    /// a shape are served.
    pub fn served_fields(&self, kind: &str) -> Option<&Map<String, Value>> {
        if !self.shapes.contains_key(kind) {
            return None;
        }
        self.entries.get(kind).and_then(Value::as_object)
    }

    /// Kinds that failed to compile in this generation.
    pub fn failures(&self) -> &[UnknownTypeError] {
        &self.failures
    }

    /// Kinds whose new entry failed to compile and that still run on the
    /// previous generation's shape.
    pub fn retained(&self) -> &[String] {
        &self.retained
    }
}

impl ShapeProvider for ActiveSchema {
    fn shape(&self, kind: &str) -> Option<Arc<CompiledShape>> {
        self.shapes.get(kind).cloned()
    }
}

/// Outcome of a successful reload.
#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub generation: u64,
    /// Kinds that compiled from the new source, in definition order.
    pub compiled: Vec<String>,
    /// Kinds rejected for unknown type tags.
    pub failures: Vec<UnknownTypeError>,
    /// Rejected kinds that kept their previous shape.
    pub retained: Vec<String>,
}

type Fingerprint = [u8; 32];

fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Sha256::digest(bytes).into()
}

/// Process-wide owner of the schema definition.
pub struct SchemaRegistry {
    source: PathBuf,
    active: watch::Sender<Arc<ActiveSchema>>,
    /// Fingerprint of the last source content seen (adopted or rejected).
    /// Also serializes reloads.
    seen: Mutex<Option<Fingerprint>>,
}

impl SchemaRegistry {
    /// Load the source for the first time. Fails if there is nothing to serve.
    pub async fn open(source: impl Into<PathBuf>) -> Result<Self, SchemaLoadError> {
        let source = source.into();
        let bytes = read_source(&source).await?;
        let (definition, entries) = parse(&source, &bytes)?;
        let active = Arc::new(ActiveSchema::build(1, definition, entries, None));
        log_failures(&active);
        tracing::info!(
            source = %source.display(),
            kinds = active.definition.len(),
            "schema definitions loaded"
        );
        let (tx, _rx) = watch::channel(active);
        Ok(SchemaRegistry {
            source,
            active: tx,
            seen: Mutex::new(Some(fingerprint(&bytes))),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Read and parse the source without adopting it.
    pub async fn load(&self) -> Result<SchemaDefinition, SchemaLoadError> {
        let bytes = read_source(&self.source).await?;
        parse(&self.source, &bytes).map(|(definition, _)| definition)
    }

    /// Re-read the source and adopt it if it parses. On error the active
    /// definition is left untouched.
    pub async fn reload(&self) -> Result<ReloadReport, SchemaLoadError> {
        let mut seen = self.seen.lock().await;
        let bytes = read_source(&self.source).await?;
        *seen = Some(fingerprint(&bytes));
        let (definition, entries) = parse(&self.source, &bytes)?;
        Ok(self.adopt(definition, entries))
    }

    /// The active snapshot.
    pub fn current(&self) -> Arc<ActiveSchema> {
        self.active.borrow().clone()
    }

    /// Receive every snapshot adopted from now on.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ActiveSchema>> {
        self.active.subscribe()
    }

    /// Poll the source every `poll` and reload when its content changes.
    ///
    /// `on_change` runs after each adopted reload. A bad reload is logged and
    /// the old schema kept; the same bad content is not re-parsed on later
    /// ticks.
    pub fn watch_for_changes<F>(self: &Arc<Self>, poll: Duration, mut on_change: F) -> JoinHandle<()>
    where
        F: FnMut(&Arc<ActiveSchema>) + Send + 'static,
    {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match registry.poll_source().await {
                    Ok(Some(active)) => on_change(&active),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "schema reload rejected, keeping previous definitions"),
                }
            }
        })
    }

    /// One watch tick. `Ok(None)` when the content is unchanged.
    async fn poll_source(&self) -> Result<Option<Arc<ActiveSchema>>, SchemaLoadError> {
        let mut seen = self.seen.lock().await;
        let bytes = match read_source(&self.source).await {
            Ok(bytes) => bytes,
            // Editors often replace the file; report a missing source once.
            Err(e) if seen.is_none() => {
                tracing::debug!(error = %e, "schema source still unreadable");
                return Ok(None);
            }
            Err(e) => {
                *seen = None;
                return Err(e);
            }
        };
        let fp = fingerprint(&bytes);
        if *seen == Some(fp) {
            return Ok(None);
        }
        *seen = Some(fp);
        tracing::info!(source = %self.source.display(), "schema source changed, reloading");
        let (definition, entries) = parse(&self.source, &bytes)?;
        self.adopt(definition, entries);
        Ok(Some(self.current()))
    }

    fn adopt(&self, definition: SchemaDefinition, entries: Map<String, Value>) -> ReloadReport {
        let previous = self.current();
        let generation = previous.generation + 1;
        let active = Arc::new(ActiveSchema::build(
            generation,
            definition,
            entries,
            Some(previous.as_ref()),
        ));
        log_failures(&active);
        let report = ReloadReport {
            generation,
            compiled: active
                .definition
                .kinds()
                .filter(|k| active.shapes.contains_key(*k) && !active.retained.iter().any(|r| r == *k))
                .map(str::to_string)
                .collect(),
            failures: active.failures.clone(),
            retained: active.retained.clone(),
        };
        self.active.send_replace(active);
        tracing::info!(
            generation,
            compiled = report.compiled.len(),
            rejected = report.failures.len(),
            retained = report.retained.len(),
            "schema definitions reloaded"
        );
        report
    }
}

impl ShapeProvider for SchemaRegistry {
    fn shape(&self, kind: &str) -> Option<Arc<CompiledShape>> {
        self.active.borrow().shape(kind)
    }
}

async fn read_source(path: &Path) -> Result<Vec<u8>, SchemaLoadError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| SchemaLoadError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse the typed definition plus the raw per-kind entries it came from.
fn parse(path: &Path, bytes: &[u8]) -> Result<(SchemaDefinition, Map<String, Value>), SchemaLoadError> {
    let wrap = |source| SchemaLoadError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let definition = SchemaDefinition::from_json_slice(bytes).map_err(wrap)?;
    let entries = serde_json::from_slice(bytes).map_err(wrap)?;
    Ok((definition, entries))
}

fn log_failures(active: &ActiveSchema) {
    for failure in &active.failures {
        if active.retained.contains(&failure.kind) {
            tracing::warn!(
                kind = %failure.kind,
                field = %failure.field,
                tag = %failure.tag,
                "unknown type tag in edited kind, keeping previous shape"
            );
        } else {
            tracing::error!(
                kind = %failure.kind,
                field = %failure.field,
                tag = %failure.tag,
                "kind not compiled: unknown type tag"
            );
        }
    }
}
