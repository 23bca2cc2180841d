//! Shared server state and the origin allow-list.

use std::sync::Arc;

use testboard_schema::SchemaRegistry;
use testboard_storage::RecordStore;
use tokio::sync::watch;

use super::watcher::ReconnectPolicy;

/// Origins permitted to open the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Parse a comma-separated list; `*` anywhere allows every origin.
    pub(crate) fn parse(spec: &str) -> Self {
        let origins: Vec<String> = spec
            .split(',')
            .map(|o| o.trim().trim_end_matches('/'))
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        }
    }

    /// Requests without an `Origin` header come from non-browser clients
    /// and are always allowed.
    pub(crate) fn allows(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (AllowedOrigins::Any, _) | (_, None) => true,
            (AllowedOrigins::List(list), Some(origin)) => {
                let origin = origin.trim_end_matches('/');
                list.iter().any(|o| o.eq_ignore_ascii_case(origin))
            }
        }
    }
}

/// Application state shared across connections.
pub(crate) struct AppState {
    pub(crate) registry: Arc<SchemaRegistry>,
    pub(crate) store: Arc<dyn RecordStore>,
    /// The record kind every subscriber is shown.
    pub(crate) kind: String,
    pub(crate) origins: AllowedOrigins,
    pub(crate) reconnect: ReconnectPolicy,
    /// Flips to `true` when the server begins shutting down.
    pub(crate) shutdown: watch::Receiver<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_and_empty_allow_everything() {
        assert_eq!(AllowedOrigins::parse("*"), AllowedOrigins::Any);
        assert_eq!(AllowedOrigins::parse(""), AllowedOrigins::Any);
        assert_eq!(AllowedOrigins::parse("http://a, *"), AllowedOrigins::Any);
        assert!(AllowedOrigins::Any.allows(Some("http://evil.example")));
    }

    #[test]
    fn list_matches_exact_origins() {
        let origins = AllowedOrigins::parse("http://localhost:3000, https://board.example/");
        assert!(origins.allows(Some("http://localhost:3000")));
        assert!(origins.allows(Some("https://board.example")));
        assert!(origins.allows(Some("HTTPS://BOARD.EXAMPLE")));
        assert!(!origins.allows(Some("http://localhost:3001")));
        assert!(origins.allows(None));
    }
}
