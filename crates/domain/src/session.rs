//! Session data model — §3 of the spec.
//!
//! A session is the per-call/per-socket state bundle owned by exactly one
//! Turn Controller. It is hydrated from the KV store, mutated only by its
//! owner and the Call Event Processor's field-level setter, and persisted
//! after every mutation that crosses a turn boundary.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry in an agent's turn history. Mirrors §3's turn-entry taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum TurnEntry {
    System {
        text: String,
    },
    User {
        text: String,
    },
    Assistant {
        text: String,
    },
    /// An assistant turn that requested a tool call.
    AssistantToolRequest {
        call_id: String,
        tool_name: String,
        /// Opaque, provider-supplied arguments — kept as the raw string the
        /// LLM streamed so re-parsing failures are reproducible.
        arguments_json: String,
    },
    /// The result of executing a previously requested tool call.
    ToolResult {
        call_id: String,
        tool_name: String,
        result_json: String,
        is_error: bool,
    },
}

impl TurnEntry {
    pub fn call_id(&self) -> Option<&str> {
        match self {
            TurnEntry::AssistantToolRequest { call_id, .. } => Some(call_id),
            TurnEntry::ToolResult { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}

/// One queued outbound utterance awaiting sequential TTS playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedUtterance {
    pub text: String,
    #[serde(default)]
    pub use_ssml: bool,
    pub voice: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    "en-US".into()
}

/// One sample of {start, end} for a named latency stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatencySample {
    /// Milliseconds since the Unix epoch.
    pub start_ms: i64,
    pub end_ms: i64,
}

impl LatencySample {
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// Aggregate statistics for one latency stage, used by the readiness surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct LatencyStageSummary {
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: i64,
    pub max_ms: i64,
}

/// Free-form, known-key context carried alongside `extra`. Hot flags
/// (`tts_interrupted`, `bot_speaking`) are mutated through the KV store's
/// field-level setter (§3 Ownership) rather than a whole-hash rewrite.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionContext {
    pub caller_phone: Option<String>,
    pub caller_name: Option<String>,
    pub policy_id: Option<String>,
    #[serde(default)]
    pub slots: HashMap<String, serde_json::Value>,
    /// Last result per tool name.
    #[serde(default)]
    pub tool_outputs: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tts_interrupted: bool,
    #[serde(default)]
    pub bot_speaking: bool,
    #[serde(default)]
    pub interrupt_count: u32,
    #[serde(default)]
    pub greeted: bool,
    #[serde(default)]
    pub call_active: bool,
    #[serde(default)]
    pub intake_completed: bool,
    /// DTMF validation scratch space, namespaced under `validation.*` in
    /// the spec's prose; modeled here as its own sub-struct for clarity.
    #[serde(default)]
    pub validation: ValidationState,
    /// Anything not given a first-class field above.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ValidationState {
    pub digit_buffer: String,
    pub attempts: u32,
}

/// The per-call/per-socket session record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub authenticated: bool,
    pub active_agent: Option<String>,
    #[serde(default)]
    pub histories: HashMap<String, Vec<TurnEntry>>,
    #[serde(default)]
    pub context: SessionContext,
    #[serde(default)]
    pub message_queue: VecDeque<QueuedUtterance>,
    #[serde(default)]
    pub latency_samples: HashMap<String, Vec<LatencySample>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session with invariants restored — §4.1 `Load` contract for
    /// the no-record-found case.
    pub fn fresh(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            authenticated: false,
            active_agent: None,
            histories: HashMap::new(),
            context: SessionContext::default(),
            message_queue: VecDeque::new(),
            latency_samples: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_call_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Append an entry to an agent's history, enforcing the "at most one
    /// system entry, and only first" invariant (§3 Invariants).
    pub fn append_turn(&mut self, agent: &str, entry: TurnEntry) {
        let history = self.histories.entry(agent.to_owned()).or_default();
        if matches!(entry, TurnEntry::System { .. }) {
            if let Some(TurnEntry::System { .. }) = history.first() {
                history[0] = entry;
            } else {
                history.insert(0, entry);
            }
        } else {
            history.push(entry);
        }
        self.updated_at = Utc::now();
    }

    pub fn history_for(&self, agent: &str) -> &[TurnEntry] {
        self.histories.get(agent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Verify the tool-result pairing invariant (§3, testable property 3)
    /// for one agent's history. Used in tests and in `Persist`'s debug path.
    pub fn tool_results_are_paired(&self, agent: &str) -> bool {
        let history = self.history_for(agent);
        let mut requested = std::collections::HashSet::new();
        for entry in history {
            match entry {
                TurnEntry::AssistantToolRequest { call_id, .. } => {
                    requested.insert(call_id.clone());
                }
                TurnEntry::ToolResult { call_id, .. } => {
                    if !requested.contains(call_id) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        true
    }

    pub fn note_latency(&mut self, stage: &str, start_ms: i64, end_ms: i64) {
        self.latency_samples
            .entry(stage.to_owned())
            .or_default()
            .push(LatencySample { start_ms, end_ms });
    }

    /// Supplemented from `original_source/conversation_state.py::latency_summary`.
    pub fn latency_summary(&self) -> HashMap<String, LatencyStageSummary> {
        self.latency_samples
            .iter()
            .map(|(stage, samples)| (stage.clone(), summarize_latency_samples(samples)))
            .collect()
    }

    /// Counts occurrences of `needle` across every turn-entry this session
    /// carries, in every agent's history. Used only by the contamination
    /// test (S6): a session should never contain text belonging to another
    /// concurrent session, so `contamination_count(other_session_marker)`
    /// must be zero.
    pub fn contamination_count(&self, needle: &str) -> usize {
        if needle.is_empty() {
            return 0;
        }
        self.histories
            .values()
            .flatten()
            .map(|entry| match entry {
                TurnEntry::System { text } | TurnEntry::User { text } | TurnEntry::Assistant { text } => {
                    text.matches(needle).count()
                }
                TurnEntry::AssistantToolRequest { arguments_json, .. } => arguments_json.matches(needle).count(),
                TurnEntry::ToolResult { result_json, .. } => result_json.matches(needle).count(),
            })
            .sum()
    }
}

/// Shared min/avg/max reduction over a stage's raw samples. Used both by
/// `Session::latency_summary` (one call) and
/// `SessionStore::aggregate_latency_summary` (merged across every call).
pub fn summarize_latency_samples(samples: &[LatencySample]) -> LatencyStageSummary {
    let durations: Vec<i64> = samples.iter().map(LatencySample::duration_ms).collect();
    let count = durations.len();
    let avg_ms = if count == 0 {
        0.0
    } else {
        durations.iter().sum::<i64>() as f64 / count as f64
    };
    let min_ms = durations.iter().copied().min().unwrap_or(0);
    let max_ms = durations.iter().copied().max().unwrap_or(0);
    LatencyStageSummary { count, avg_ms, min_ms, max_ms }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_has_no_histories() {
        let s = Session::fresh("sess-1");
        assert!(s.histories.is_empty());
        assert!(!s.authenticated);
    }

    #[test]
    fn append_turn_inserts_system_entry_first() {
        let mut s = Session::fresh("sess-1");
        s.append_turn("auth", TurnEntry::User { text: "hi".into() });
        s.append_turn(
            "auth",
            TurnEntry::System {
                text: "you are an auth agent".into(),
            },
        );
        assert!(matches!(s.history_for("auth")[0], TurnEntry::System { .. }));
        assert_eq!(s.history_for("auth").len(), 2);
    }

    #[test]
    fn append_turn_replaces_existing_system_entry_in_place() {
        let mut s = Session::fresh("sess-1");
        s.append_turn(
            "auth",
            TurnEntry::System {
                text: "v1".into(),
            },
        );
        s.append_turn(
            "auth",
            TurnEntry::System {
                text: "v2".into(),
            },
        );
        assert_eq!(s.history_for("auth").len(), 1);
        assert!(matches!(&s.history_for("auth")[0], TurnEntry::System { text } if text == "v2"));
    }

    #[test]
    fn tool_results_are_paired_detects_orphan_result() {
        let mut s = Session::fresh("sess-1");
        s.append_turn(
            "intake",
            TurnEntry::ToolResult {
                call_id: "c1".into(),
                tool_name: "refill_prescription".into(),
                result_json: "{}".into(),
                is_error: false,
            },
        );
        assert!(!s.tool_results_are_paired("intake"));
    }

    #[test]
    fn tool_results_are_paired_accepts_matching_request() {
        let mut s = Session::fresh("sess-1");
        s.append_turn(
            "intake",
            TurnEntry::AssistantToolRequest {
                call_id: "c1".into(),
                tool_name: "refill_prescription".into(),
                arguments_json: "{}".into(),
            },
        );
        s.append_turn(
            "intake",
            TurnEntry::ToolResult {
                call_id: "c1".into(),
                tool_name: "refill_prescription".into(),
                result_json: "{}".into(),
                is_error: false,
            },
        );
        assert!(s.tool_results_are_paired("intake"));
    }

    #[test]
    fn latency_summary_computes_avg_min_max() {
        let mut s = Session::fresh("sess-1");
        s.note_latency("stt", 0, 100);
        s.note_latency("stt", 0, 300);
        let summary = s.latency_summary();
        let stt = summary.get("stt").unwrap();
        assert_eq!(stt.count, 2);
        assert!((stt.avg_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(stt.min_ms, 100);
        assert_eq!(stt.max_ms, 300);
    }

    #[test]
    fn latency_summary_empty_when_no_samples() {
        let s = Session::fresh("sess-1");
        assert!(s.latency_summary().is_empty());
    }

    #[test]
    fn contamination_count_finds_leaked_marker() {
        let mut s = Session::fresh("sess-a");
        s.append_turn("intake", TurnEntry::User { text: "my id is sess-b-secret".into() });
        assert_eq!(s.contamination_count("sess-b-secret"), 1);
        assert_eq!(s.contamination_count("sess-a-secret"), 0);
    }

    #[test]
    fn contamination_count_is_zero_for_clean_session() {
        let mut s = Session::fresh("sess-a");
        s.append_turn("intake", TurnEntry::User { text: "hello there".into() });
        assert_eq!(s.contamination_count("sess-b"), 0);
    }
}
