//! JSON-file record store.
//!
//! The file holds one document, `{ kind: [record, ...], ... }`. Every read
//! goes to the file, so writes made by other processes are visible
//! immediately; a background poller turns those writes into change events.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use testboard_interchange::Record;
use testboard_schema::ShapeProvider;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::StorageError;
use crate::feed::{ChangeFeed, ChangeStream};
use crate::traits::RecordStore;
use crate::write::{merged_record, new_record, not_found};

type Collections = IndexMap<String, Vec<Record>>;
type Fingerprint = [u8; 32];

/// The file content last written or observed by this process.
#[derive(Default)]
struct Observed {
    fingerprint: Option<Fingerprint>,
    collections: Collections,
    present: bool,
}

/// Record store persisted as a single JSON document.
pub struct FileStore {
    path: PathBuf,
    shapes: Arc<dyn ShapeProvider>,
    /// Queues this handle's writers before they contend for the lock file.
    write_lock: tokio::sync::Mutex<()>,
    observed: Mutex<Observed>,
    feed: ChangeFeed,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store; it is
    /// created on the first write.
    pub async fn open(
        path: impl Into<PathBuf>,
        shapes: Arc<dyn ShapeProvider>,
    ) -> Result<Self, StorageError> {
        let path = path.into();
        let observed = match tokio::fs::read(&path).await {
            Ok(bytes) => Observed {
                fingerprint: Some(fingerprint(&bytes)),
                collections: parse(&bytes, &path, "*")?,
                present: true,
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Observed::default(),
            Err(e) => return Err(read_error("*", &path, e)),
        };
        Ok(FileStore {
            path,
            shapes,
            write_lock: tokio::sync::Mutex::new(()),
            observed: Mutex::new(observed),
            feed: ChangeFeed::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start watching the file for writes made by other processes.
    ///
    /// The task holds only a weak reference and ends when the store is dropped.
    pub fn spawn_change_poller(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.poll_once().await;
            }
        })
    }

    /// Compare the file with what this process last saw and publish a
    /// change for every kind whose collection differs.
    async fn poll_once(&self) {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let mut observed = self.lock_observed();
                if observed.present {
                    tracing::warn!(path = %self.path.display(), "store file removed, closing change feeds");
                    *observed = Observed::default();
                    self.feed.break_streams();
                }
                return;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to poll store file");
                return;
            }
        };

        let fp = fingerprint(&bytes);
        if self.lock_observed().fingerprint == Some(fp) {
            return;
        }
        let collections = match parse(&bytes, &self.path, "*") {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "store file changed but is not readable yet");
                return;
            }
        };

        let changed = {
            let mut observed = self.lock_observed();
            let changed = changed_kinds(&observed.collections, &collections);
            *observed = Observed {
                fingerprint: Some(fp),
                collections,
                present: true,
            };
            changed
        };
        for kind in changed {
            tracing::debug!(kind = %kind, "external write detected");
            self.feed.publish(&kind);
        }
    }

    fn lock_observed(&self) -> std::sync::MutexGuard<'_, Observed> {
        self.observed.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn read_collections(&self, kind: &str) -> Result<Collections, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => parse(&bytes, &self.path, kind),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Collections::new()),
            Err(e) => Err(read_error(kind, &self.path, e)),
        }
    }

    /// Read-modify-write the document while holding the store's lock file,
    /// then publish a change for `kind`. `edit` runs on a blocking thread.
    async fn modify<T, F>(&self, kind: &str, edit: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Collections) -> Result<T, StorageError> + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        let owned_kind = kind.to_string();
        let (bytes, collections, out) = tokio::task::spawn_blocking(move || {
            let _lock = DocumentLock::acquire(&path, &owned_kind)?;
            let mut collections = read_document(&path, &owned_kind)?;
            let out = edit(&mut collections)?;
            let bytes = persist_document(&path, &owned_kind, &collections)?;
            Ok::<_, StorageError>((bytes, collections, out))
        })
        .await
        .map_err(|e| StorageError::Write {
            kind: kind.to_string(),
            message: e.to_string(),
        })??;

        *self.lock_observed() = Observed {
            fingerprint: Some(fingerprint(&bytes)),
            collections,
            present: true,
        };
        self.feed.publish(kind);
        Ok(out)
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn find_all(&self, kind: &str) -> Result<Vec<Record>, StorageError> {
        let mut collections = self.read_collections(kind).await?;
        Ok(collections.shift_remove(kind).unwrap_or_default())
    }

    async fn insert(&self, kind: &str, fields: Map<String, Value>) -> Result<Record, StorageError> {
        let record = new_record(self.shapes.as_ref(), kind, fields)?;
        let owned_kind = kind.to_string();
        self.modify(kind, move |collections| {
            collections.entry(owned_kind).or_default().push(record.clone());
            Ok(record)
        })
        .await
    }

    async fn update(
        &self,
        kind: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Record, StorageError> {
        let shapes = Arc::clone(&self.shapes);
        let owned_kind = kind.to_string();
        let id = id.to_string();
        self.modify(kind, move |collections| {
            let slot = collections
                .get_mut(&owned_kind)
                .and_then(|records| records.iter_mut().find(|r| r.id == id))
                .ok_or_else(|| not_found(&owned_kind, &id))?;
            let updated = merged_record(shapes.as_ref(), &owned_kind, slot, fields)?;
            *slot = updated.clone();
            Ok(updated)
        })
        .await
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<(), StorageError> {
        let owned_kind = kind.to_string();
        let id = id.to_string();
        self.modify(kind, move |collections| {
            let records = collections
                .get_mut(&owned_kind)
                .ok_or_else(|| not_found(&owned_kind, &id))?;
            let index = records
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| not_found(&owned_kind, &id))?;
            records.remove(index);
            Ok(())
        })
        .await
    }

    async fn watch(&self, kind: &str) -> Result<ChangeStream, StorageError> {
        Ok(self.feed.subscribe(kind))
    }

    fn active_watches(&self) -> usize {
        self.feed.active_watches()
    }
}

fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Sha256::digest(bytes).into()
}

fn parse(bytes: &[u8], path: &Path, kind: &str) -> Result<Collections, StorageError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Collections::new());
    }
    serde_json::from_slice(bytes).map_err(|e| StorageError::Read {
        kind: kind.to_string(),
        message: format!("{}: {}", path.display(), e),
    })
}

fn read_error(kind: &str, path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Read {
        kind: kind.to_string(),
        message: format!("{}: {}", path.display(), e),
    }
}

fn write_error(kind: &str, path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Write {
        kind: kind.to_string(),
        message: format!("{}: {}", path.display(), e),
    }
}

/// `<store>.lock`, the file every writer locks before touching the store.
fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Exclusive advisory lock on the store's lock file, held until dropped.
/// Other handles and other processes block in [`DocumentLock::acquire`].
struct DocumentLock {
    _file: std::fs::File,
}

impl DocumentLock {
    fn acquire(path: &Path, kind: &str) -> Result<Self, StorageError> {
        let lock_path = lock_path(path);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| write_error(kind, &lock_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            // SAFETY: the descriptor belongs to `file`, which outlives the call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc != 0 {
                return Err(write_error(kind, &lock_path, std::io::Error::last_os_error()));
            }
        }

        Ok(DocumentLock { _file: file })
    }
}

fn read_document(path: &Path, kind: &str) -> Result<Collections, StorageError> {
    match std::fs::read(path) {
        Ok(bytes) => parse(&bytes, path, kind),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Collections::new()),
        Err(e) => Err(read_error(kind, path, e)),
    }
}

/// Write the document to a fresh temp file beside the store and rename it
/// into place. Returns the bytes written.
fn persist_document(path: &Path, kind: &str, collections: &Collections) -> Result<Vec<u8>, StorageError> {
    let bytes = serde_json::to_vec_pretty(collections).map_err(|e| StorageError::Write {
        kind: kind.to_string(),
        message: e.to_string(),
    })?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_error(kind, path, e))?;
    tmp.write_all(&bytes).map_err(|e| write_error(kind, path, e))?;
    tmp.persist(path).map_err(|e| write_error(kind, path, e.error))?;
    Ok(bytes)
}

fn changed_kinds(old: &Collections, new: &Collections) -> Vec<String> {
    let mut changed: Vec<String> = new
        .iter()
        .filter(|(kind, records)| old.get(*kind) != Some(*records))
        .map(|(kind, _)| kind.clone())
        .collect();
    changed.extend(
        old.keys()
            .filter(|kind| !new.contains_key(*kind))
            .cloned(),
    );
    changed
}
