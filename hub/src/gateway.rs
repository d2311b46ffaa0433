//! WebSocket and HTTP surface of the hub.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::hub::RateHub;
use crate::registry::Subscriber;

/// Build the router serving `/ws`, `/health` and `/metrics`.
pub fn router(hub: Arc<RateHub>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(hub)
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<RateHub>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<RateHub>) {
    let (subscriber, mut rx) = Subscriber::channel(hub.config().subscriber_buffer);
    let id = subscriber.id();
    info!(subscriber_id = %id, "New WebSocket connection");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Forward queued events to the socket; close it once the queue ends.
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(event.as_ref()) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!(subscriber_id = %id, error = %e, "Failed to serialize event");
                }
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    if let Err(e) = hub.on_subscriber_connected(subscriber).await {
        // The subscriber was dropped, so the queue drains the error event and ends.
        warn!(subscriber_id = %id, error = %e, "Closing WebSocket after failed join");
        let _ = send_task.await;
        return;
    }

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                info!(subscriber_id = %id, "WebSocket close requested");
                break;
            }
            Ok(_) => {
                debug!(subscriber_id = %id, "Ignoring inbound message");
            }
            Err(e) => {
                warn!(subscriber_id = %id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    hub.on_subscriber_disconnected(&id);
    send_task.abort();
    info!(subscriber_id = %id, "WebSocket connection closed");
}

async fn health_handler(State(hub): State<Arc<RateHub>>) -> impl IntoResponse {
    let snapshot = hub.snapshot();
    Json(json!({
        "status": "ok",
        "subscribers": hub.subscriber_count(),
        "scheduler": hub.scheduler_state().as_str(),
        "base": snapshot.as_ref().map(|s| s.base.clone()),
        "rates": snapshot.as_ref().map(|s| s.len()).unwrap_or(0),
        "lastUpdatedAt": snapshot.as_ref().map(|s| s.last_updated_at.timestamp_millis()),
    }))
}

async fn metrics_handler(State(hub): State<Arc<RateHub>>) -> impl IntoResponse {
    hub.metrics().to_prometheus()
}
