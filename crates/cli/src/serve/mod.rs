//! `testboard serve` -- live snapshot push server.
//!
//! Each WebSocket subscriber gets its own change watcher and broadcast
//! session: a full snapshot of the configured kind on connect, then one
//! more after every change. Schema edits are picked up without a restart.
//!
//! Endpoints:
//! - GET /socket - snapshot push channel (WebSocket)
//! - GET /       - same as /socket
//!
//! Anything else answers 404 with a JSON body.

mod handlers;
mod session;
mod state;
#[cfg(test)]
mod test_support;
mod watcher;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use testboard_schema::{SchemaRegistry, ShapeProvider};
use testboard_storage::{open_store, StoreUrl};
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use self::handlers::{handle_not_found, handle_socket};
use self::state::{AllowedOrigins, AppState};
use self::watcher::ReconnectPolicy;

/// Settings for one server process.
#[derive(Debug, Clone)]
pub(crate) struct ServeConfig {
    pub(crate) port: u16,
    pub(crate) schema: PathBuf,
    pub(crate) store_url: String,
    pub(crate) kind: String,
    pub(crate) allowed_origins: String,
    /// Poll interval for the schema file and file-backed stores.
    pub(crate) poll_interval: Duration,
}

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET]).allow_headers(Any);
    match origins {
        AllowedOrigins::Any => layer.allow_origin(Any),
        AllowedOrigins::List(list) => {
            let values: Vec<HeaderValue> = list
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        tracing::warn!(origin = %o, "ignoring unparsable origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(values))
        }
    }
}

fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.origins);
    Router::new()
        .route("/socket", get(handle_socket))
        .route("/", get(handle_socket))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(state)
}

/// Load the schema, open the store and serve until Ctrl+C.
pub(crate) async fn start_server(config: ServeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(SchemaRegistry::open(&config.schema).await?);
    if registry.current().fields(&config.kind).is_none() {
        tracing::warn!(kind = %config.kind, "kind is not in the schema; snapshots will carry no schema");
    }

    let reload_task = registry.watch_for_changes(config.poll_interval, |active| {
        let kinds: Vec<&str> = active.definition().kinds().collect();
        tracing::info!(generation = active.generation(), ?kinds, "schema definitions replaced");
    });

    let url: StoreUrl = config.store_url.parse()?;
    let shapes: Arc<dyn ShapeProvider> = registry.clone();
    let store = open_store(&url, shapes, config.poll_interval).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = Arc::new(AppState {
        registry,
        store,
        kind: config.kind.clone(),
        origins: AllowedOrigins::parse(&config.allowed_origins),
        reconnect: ReconnectPolicy::default(),
        shutdown: shutdown_rx,
    });

    let app = router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, kind = %config.kind, "testboard listening");
    eprintln!("testboard listening on ws://{}/socket", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    reload_task.abort();
    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}

