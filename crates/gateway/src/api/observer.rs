//! Observer relay (§4.10) — a read-only WebSocket a supervisor dashboard
//! opens to watch every live call's transcript and tool activity.
//!
//! The socket is outbound-only: the gateway pushes `ObserverFrame`s as the
//! turn controller and call-event handlers publish them through the
//! broadcast hub, and ignores anything the client sends (aside from
//! close/ping bookkeeping). The hub is process-wide (§4.10), so one
//! subscriber sees every call; each frame carries its own `call_id` for
//! the client to filter on if it only cares about one.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// `GET /ws/observer` — subscribe to every call's observer frames.
pub async fn observer_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_observer_socket(socket, state))
}

async fn handle_observer_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel(64);

    state.broadcast.add(tx.clone());
    tracing::info!(observers = state.broadcast.observer_count(), "observer connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if ws_sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Drain inbound traffic purely to detect close; observers have nothing
    // to say back.
    while let Some(msg) = ws_stream.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    writer.abort();
    state.broadcast.remove(&tx);
    tracing::info!("observer disconnected");
}
