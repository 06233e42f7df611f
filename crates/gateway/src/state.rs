//! Shared application state handed to every axum handler.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use va_callcontrol::{CallControlClient, CallEventProcessor};
use va_domain::config::Config;
use va_providers::{SttAdapterFactory, TtsAdapter};
use va_sessions::SessionStore;

use crate::runtime::broadcast::BroadcastHub;
use crate::runtime::cancel::CancelMap;
use crate::runtime::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub broadcast: Arc<BroadcastHub>,
    pub call_events: Arc<CallEventProcessor>,
    pub call_control: Arc<dyn CallControlClient>,
    pub cancel_map: Arc<CancelMap>,
    /// Mints a fresh `SttAdapter` per call (§4.2) rather than sharing one
    /// process-wide recognizer across concurrent calls.
    pub stt: Arc<dyn SttAdapterFactory>,
    pub tts: Arc<dyn TtsAdapter>,
    /// Target numbers with an outbound `initiate_call` in flight, so a
    /// double-submit of `POST /calls` for the same number is rejected
    /// instead of placing two calls (SPEC_FULL §B).
    pub pending_outbound: Arc<Mutex<HashSet<String>>>,
    /// SHA-256 of the configured API token, if any (`None` = dev mode, no
    /// auth required — see `api::auth::require_api_token`).
    pub api_token_hash: Option<Vec<u8>>,
    pub started_at: DateTime<Utc>,
}
