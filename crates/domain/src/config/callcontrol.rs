use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Call-control (telephony provider — interface + defaults only)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallControlConfig {
    /// Env var holding the call-control connection string.
    #[serde(default = "d_conn_env")]
    pub connection_string_env: String,
    /// E.164 source number used to place outbound calls.
    #[serde(default)]
    pub source_phone: Option<String>,
    /// Base URL the provider uses to call back into this gateway.
    #[serde(default = "d_callback_base")]
    pub callback_base_url: String,
    /// Websocket path the provider streams caller audio to.
    #[serde(default = "d_ws_path")]
    pub websocket_path: String,
    /// Recovery policy for a recognize/play failure carrying a known subcode.
    #[serde(default)]
    pub recovery: RecoveryPolicy,
}

impl Default for CallControlConfig {
    fn default() -> Self {
        Self {
            connection_string_env: d_conn_env(),
            source_phone: None,
            callback_base_url: d_callback_base(),
            websocket_path: d_ws_path(),
            recovery: RecoveryPolicy::default(),
        }
    }
}

/// Open Question (spec §9) resolution: recovery policy for subcode 8581
/// ("transcription stalled") and similar recoverable call-control failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "d_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff doubles after each attempt.
    #[serde(default = "d_true")]
    pub exponential: bool,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: d_max_attempts(),
            initial_backoff_ms: d_backoff_ms(),
            exponential: true,
        }
    }
}

fn d_conn_env() -> String {
    "VA_CALLCONTROL_CONNECTION_STRING".into()
}
fn d_callback_base() -> String {
    "http://localhost:8080".into()
}
fn d_ws_path() -> String {
    "/ws/audio".into()
}
fn d_max_attempts() -> u32 {
    2
}
fn d_backoff_ms() -> u64 {
    500
}
fn d_true() -> bool {
    true
}
