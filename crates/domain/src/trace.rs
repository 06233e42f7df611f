use serde::Serialize;

/// Structured trace events emitted across the voice-agent-gateway crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        session_id: String,
        is_new: bool,
    },
    SessionReset {
        session_id: String,
        reason: String,
    },
    BargeIn {
        session_id: String,
        interrupt_count: u32,
    },
    DtmfTransition {
        session_id: String,
        from: String,
        to: String,
    },
    GreetingPlayed {
        call_id: String,
    },
    ToolStart {
        session_id: String,
        call_id: String,
        tool_name: String,
    },
    ToolEnd {
        session_id: String,
        call_id: String,
        tool_name: String,
        status: String,
        elapsed_ms: u64,
    },
    CallControlEvent {
        call_id: String,
        event_type: String,
    },
    CallControlRecoveryAttempted {
        call_id: String,
        subcode: u32,
        attempt: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "va_event");
    }
}
