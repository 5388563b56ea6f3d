//! The HTTP query directory.
//!
//! The same listener serves both roles: a request to `/` that upgrades
//! becomes a replication peer, everything else is a read-only query over the
//! opened log and the content store. Every response allows cross-origin
//! reads so browser clients can query any directory directly.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bog_core::Timestamp;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::peers::PEER_CHANNEL_CAPACITY;

/// Window of the `/latest` view.
pub const LATEST_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Builds the directory router over a shared endpoint.
pub fn router(endpoint: Arc<Endpoint>) -> Router {
    Router::new()
        .route("/", get(upgrade_handler))
        .route("/all", get(all_handler))
        .route("/latest", get(latest_handler))
        .route("/{key}", get(key_handler))
        .with_state(endpoint)
}

const ALLOW_ANY_ORIGIN: (header::HeaderName, &str) = (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");

async fn upgrade_handler(
    State(endpoint): State<Arc<Endpoint>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_peer(endpoint, socket))
}

async fn all_handler(State(endpoint): State<Arc<Endpoint>>) -> Response {
    entries_json(&endpoint.log().query(None))
}

async fn latest_handler(State(endpoint): State<Arc<Endpoint>>) -> Response {
    let cutoff = Timestamp::now().as_millis() - LATEST_WINDOW.as_millis() as i64;
    let entries: Vec<_> = endpoint
        .log()
        .entries()
        .iter()
        .filter(|e| e.ts_millis() >= cutoff)
        .cloned()
        .collect();
    entries_json(&entries)
}

/// One path segment queries everything: author pubkey, envelope hash, text
/// search (with a leading `?`), and finally the raw blob under that key.
async fn key_handler(
    State(endpoint): State<Arc<Endpoint>>,
    Path(key): Path<String>,
) -> Response {
    let entries = endpoint.log().query(Some(&key));
    if !entries.is_empty() {
        return entries_json(&entries);
    }

    match endpoint.store().get(&key) {
        Ok(Some(blob)) => ([ALLOW_ANY_ORIGIN], blob).into_response(),
        Ok(None) => ([ALLOW_ANY_ORIGIN], StatusCode::NOT_FOUND).into_response(),
        Err(_) => ([ALLOW_ANY_ORIGIN], StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

fn entries_json(entries: &[bog_log::LogEntry]) -> Response {
    match serde_json::to_string(entries) {
        Ok(body) => (
            [
                ALLOW_ANY_ORIGIN,
                (header::CONTENT_TYPE, "application/json"),
            ],
            body,
        )
            .into_response(),
        Err(_) => ([ALLOW_ANY_ORIGIN], StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Runs one upgraded connection as a replication peer until it closes.
async fn serve_peer(endpoint: Arc<Endpoint>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(PEER_CHANNEL_CAPACITY);
    let peer_id = endpoint.peers().add(tx);
    debug!(%peer_id, "inbound peer upgraded");

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => endpoint.handle_frame(peer_id, text.as_str()),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    endpoint.peers().remove(peer_id);
    writer.abort();
    debug!(%peer_id, "inbound peer closed");
}
