use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use testboard_schema::ShapeProvider;

use crate::error::StorageError;
use crate::file::FileStore;
use crate::memory::MemoryStore;
use crate::traits::RecordStore;

/// Where records live, parsed from a store URL.
///
/// - `memory:` / `memory://` — in-process, lost on exit.
/// - `file:<path>` / `file://<path>` — a JSON document on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUrl {
    Memory,
    File(PathBuf),
}

impl FromStr for StoreUrl {
    type Err = StorageError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| StorageError::InvalidUrl {
            url: url.to_string(),
            message: message.to_string(),
        };
        let (scheme, rest) = url
            .split_once(':')
            .ok_or_else(|| invalid("expected '<scheme>:<location>'"))?;
        let rest = rest.strip_prefix("//").unwrap_or(rest);
        match scheme {
            "memory" if rest.is_empty() => Ok(StoreUrl::Memory),
            "memory" => Err(invalid("memory store takes no location")),
            "file" if rest.is_empty() => Err(invalid("file store needs a path")),
            "file" => Ok(StoreUrl::File(PathBuf::from(rest))),
            other => Err(invalid(&format!("unsupported scheme '{}'", other))),
        }
    }
}

/// Open the store named by `url`. File stores also start a change poller
/// with the given interval.
pub async fn open_store(
    url: &StoreUrl,
    shapes: Arc<dyn ShapeProvider>,
    poll_interval: Duration,
) -> Result<Arc<dyn RecordStore>, StorageError> {
    match url {
        StoreUrl::Memory => Ok(Arc::new(MemoryStore::new(shapes))),
        StoreUrl::File(path) => {
            let store = Arc::new(FileStore::open(path.clone(), shapes).await?);
            store.spawn_change_poller(poll_interval);
            tracing::info!(path = %path.display(), "file store opened");
            Ok(store)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_urls() {
        assert_eq!("memory:".parse::<StoreUrl>().unwrap(), StoreUrl::Memory);
        assert_eq!("memory://".parse::<StoreUrl>().unwrap(), StoreUrl::Memory);
        assert_eq!(
            "file:records.json".parse::<StoreUrl>().unwrap(),
            StoreUrl::File(PathBuf::from("records.json"))
        );
        assert_eq!(
            "file:///var/lib/testboard/records.json"
                .parse::<StoreUrl>()
                .unwrap(),
            StoreUrl::File(PathBuf::from("/var/lib/testboard/records.json"))
        );
    }

    #[test]
    fn rejects_unknown_or_incomplete_urls() {
        for url in ["mongodb://localhost", "file:", "memory:xyz", "records.json"] {
            let err = url.parse::<StoreUrl>().unwrap_err();
            assert!(matches!(err, StorageError::InvalidUrl { .. }), "{}", url);
        }
    }
}
