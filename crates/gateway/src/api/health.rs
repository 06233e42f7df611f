//! Health, readiness, and lightweight metrics — public, no auth (§6, §7).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use va_providers::{AudioFormat, NoopSttSink, SttParams};

use crate::state::AppState;

const READY_PING_TIMEOUT: Duration = Duration::from_millis(500);
const READINESS_PROBE_SESSION_ID: &str = "__readiness_probe__";

/// `GET /v1/health` — liveness probe; 200 whenever the process is up.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /v1/ready` — fans short-timeout pings out to KV, STT, and TTS;
/// 200 when all are healthy, 503 otherwise (§6). The LLM provider has no
/// cheap no-op ping of its own — construction already failed fast at
/// startup if its config was unusable, so it is reported ready once the
/// process is serving at all. The STT ping mints a throwaway per-session
/// adapter through the factory (§4.2) rather than pinging a shared
/// instance, since there is no longer one to ping.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let kv_ok = tokio::time::timeout(READY_PING_TIMEOUT, state.sessions.load(READINESS_PROBE_SESSION_ID))
        .await
        .is_ok_and(|r| r.is_ok());
    let stt_ok = tokio::time::timeout(READY_PING_TIMEOUT, async {
        let params = SttParams {
            recognized_languages: state.config.speech.recognized_languages.clone(),
            segmentation_silence_ms: state.config.speech.segmentation_silence_ms as u64,
            audio_format: AudioFormat::Pcm16kHz16BitMono,
        };
        let adapter = state.stt.create(params).await?;
        adapter.start(Arc::new(NoopSttSink)).await?;
        adapter.stop().await
    })
    .await
    .is_ok_and(|r| r.is_ok());
    let tts_ok = tokio::time::timeout(
        READY_PING_TIMEOUT,
        state.tts.synthesize_to_pcm("", &state.config.speech.default_rate),
    )
    .await
    .is_ok_and(|r| r.is_ok());
    let llm_ok = true;

    let body = json!({ "kv": kv_ok, "llm": llm_ok, "stt": stt_ok, "tts": tts_ok });
    if kv_ok && stt_ok && tts_ok && llm_ok {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

/// `GET /v1/metrics` — coarse counters for a supervisor dashboard, plus
/// the process-wide per-stage latency summary (SPEC_FULL §B).
pub async fn metrics(State(state): State<AppState>) -> Json<Value> {
    let uptime_sec = (chrono::Utc::now() - state.started_at).num_seconds().max(0);
    Json(json!({
        "uptime_sec": uptime_sec,
        "active_sessions": state.sessions.active_count(),
        "active_calls": state.call_events.active_call_ids(),
        "latency_ms": state.sessions.aggregate_latency_summary(),
    }))
}
