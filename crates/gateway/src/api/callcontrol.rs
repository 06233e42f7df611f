//! Call-control webhook ingress (§4.5) and outbound call initiation (§6,
//! SPEC_FULL §B) — the two HTTP entry points into the telephony provider
//! boundary.
//!
//! The webhook provider may deliver either a single event object or a JSON
//! array of events in one POST, so this accepts either and forwards each
//! element to the processor individually. Parse failures and unknown event
//! types are logged and dropped inside `process_raw` itself — this handler
//! always returns 200 so the provider never retries a batch we already
//! consumed.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// `POST /callcontrol/events` — call-control event webhook.
pub async fn webhook(State(state): State<AppState>, Json(payload): Json<Value>) -> &'static str {
    match payload {
        Value::Array(events) => {
            for event in events {
                state.call_events.process_raw(&event).await;
            }
        }
        other => state.call_events.process_raw(&other).await,
    }
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct InitiateCallRequest {
    pub target_number: String,
}

/// `POST /calls` — place an outbound call (§6). Rejects a second request
/// for a number that already has one in flight rather than dialing twice.
pub async fn initiate_call(
    State(state): State<AppState>,
    Json(req): Json<InitiateCallRequest>,
) -> (StatusCode, Json<Value>) {
    {
        let mut pending = state.pending_outbound.lock();
        if !pending.insert(req.target_number.clone()) {
            tracing::warn!(target_number = %req.target_number, "duplicate initiate_call rejected");
            return (StatusCode::CONFLICT, Json(json!({ "status": "failed" })));
        }
    }

    let result = state.call_control.initiate_call(&req.target_number).await;
    state.pending_outbound.lock().remove(&req.target_number);

    match result {
        Ok(call_id) => (
            StatusCode::OK,
            Json(json!({ "message": "Call initiated", "callId": call_id })),
        ),
        Err(e) => {
            tracing::warn!(target_number = %req.target_number, error = %e, "initiate_call failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "failed" })))
        }
    }
}
