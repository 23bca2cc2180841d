//! WebSocket upgrade and fallback handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::ORIGIN;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use testboard_interchange::ServerFrame;

use super::json_error;
use super::session::{run_session, BroadcastSession, SessionEnd, SinkClosed, SnapshotSink};
use super::state::AppState;
use super::watcher::ChangeWatcher;

/// Close reason sent when a subscriber's change feed cannot be restored.
const DEGRADED_REASON: &str = "change feed unavailable";

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /socket (and /): upgrade to the snapshot push channel.
pub(crate) async fn handle_socket(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    if !state.origins.allows(origin) {
        tracing::warn!(origin = origin.unwrap_or(""), "rejected connection from disallowed origin");
        return json_error(StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }
    ws.on_upgrade(move |socket| serve_subscriber(state, socket))
}

struct SocketSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl SnapshotSink for SocketSink {
    async fn push(&mut self, frame: ServerFrame) -> Result<(), SinkClosed> {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode snapshot frame");
                return Ok(());
            }
        };
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| SinkClosed)
    }
}

async fn serve_subscriber(state: Arc<AppState>, socket: WebSocket) {
    let (sender, mut receiver) = socket.split();
    let mut sink = SocketSink(sender);
    let watcher = ChangeWatcher::new(Arc::clone(&state.store), state.kind.clone(), state.reconnect);
    let session = BroadcastSession::new(
        Arc::clone(&state.store),
        state.registry.subscribe(),
        state.kind.clone(),
    );
    let mut shutdown = state.shutdown.clone();

    tracing::info!(kind = %state.kind, "subscriber connected");

    // Inbound frames carry nothing; the loop only notices the client leaving.
    let client_gone = async move {
        while let Some(msg) = receiver.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    };
    let stopping = async move {
        let _ = shutdown.wait_for(|stopping| *stopping).await;
    };
    let disconnected = async move {
        tokio::select! {
            _ = client_gone => {}
            _ = stopping => {}
        }
    };

    match run_session(watcher, &session, &mut sink, disconnected).await {
        SessionEnd::Disconnected => {
            let _ = sink.0.close().await;
            tracing::info!("subscriber disconnected");
        }
        SessionEnd::Degraded(e) => {
            tracing::warn!(error = %e, "subscriber degraded, closing connection");
            let close = Message::Close(Some(CloseFrame {
                code: close_code::ERROR,
                reason: DEGRADED_REASON.into(),
            }));
            let _ = sink.0.send(close).await;
        }
    }
}
