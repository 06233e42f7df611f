use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dialog tuning — turn controller, DTMF validation (§4.6, §4.7)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    /// Exact-match, case-insensitive, substring stop words that end a call.
    #[serde(default = "d_stop_words")]
    pub stop_words: HashSet<String>,
    /// Sentence-boundary characters the LLM streaming consumer flushes on.
    #[serde(default = "d_boundary_chars")]
    pub boundary_chars: HashSet<char>,
    /// Wait after greeting is enqueued before treating the socket as idle.
    #[serde(default = "d_greet_wait_ms")]
    pub greet_wait_ms: u64,
    /// Outbound audio frame duration, milliseconds (10ms per §4.4).
    #[serde(default = "d_frame_ms")]
    pub outbound_frame_ms: u32,
    /// How often the outbound sender checks `tts_interrupted` (80ms per §4.7).
    #[serde(default = "d_interrupt_poll_ms")]
    pub interrupt_poll_ms: u64,
    /// Tool invocation timeout, seconds (§5 default 10s).
    #[serde(default = "d_tool_timeout_sec")]
    pub tool_timeout_sec: u64,
    /// Socket idle tick, seconds (§5 default 5s).
    #[serde(default = "d_socket_idle_sec")]
    pub socket_idle_sec: u64,
    #[serde(default)]
    pub dtmf: DtmfConfig,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            stop_words: d_stop_words(),
            boundary_chars: d_boundary_chars(),
            greet_wait_ms: d_greet_wait_ms(),
            outbound_frame_ms: d_frame_ms(),
            interrupt_poll_ms: d_interrupt_poll_ms(),
            tool_timeout_sec: d_tool_timeout_sec(),
            socket_idle_sec: d_socket_idle_sec(),
            dtmf: DtmfConfig::default(),
        }
    }
}

/// DTMF validation lifecycle tuning (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtmfConfig {
    /// Digit sequence that validates the caller, e.g. the last 4 of an ID.
    #[serde(default = "d_expected_digits")]
    pub expected_sequence: String,
    /// Max buffered digits before forcing a failed transition.
    #[serde(default = "d_max_digits")]
    pub max_digits: usize,
    /// Seconds to wait for the full sequence before timing out.
    #[serde(default = "d_collect_timeout_sec")]
    pub collect_timeout_sec: u64,
    /// Attempts allowed before the terminal `failed` state disconnects.
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
}

impl Default for DtmfConfig {
    fn default() -> Self {
        Self {
            expected_sequence: d_expected_digits(),
            max_digits: d_max_digits(),
            collect_timeout_sec: d_collect_timeout_sec(),
            max_attempts: d_max_attempts(),
        }
    }
}

fn d_stop_words() -> HashSet<String> {
    ["goodbye", "bye", "exit", "hang up", "that's all"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn d_boundary_chars() -> HashSet<char> {
    ['.', '!', '?', ';', '。', '!', '?', ';', '\n']
        .into_iter()
        .collect()
}

fn d_greet_wait_ms() -> u64 {
    2_000
}
fn d_frame_ms() -> u32 {
    10
}
fn d_interrupt_poll_ms() -> u64 {
    80
}
fn d_tool_timeout_sec() -> u64 {
    10
}
fn d_socket_idle_sec() -> u64 {
    5
}
fn d_expected_digits() -> String {
    "1234".into()
}
fn d_max_digits() -> usize {
    8
}
fn d_collect_timeout_sec() -> u64 {
    20
}
fn d_max_attempts() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_chars_include_every_spec_terminator() {
        let cfg = DialogConfig::default();
        for c in ['.', '!', '?', ';', '\n'] {
            assert!(cfg.boundary_chars.contains(&c), "missing {c:?}");
        }
    }

    #[test]
    fn stop_words_are_lowercase() {
        for w in &d_stop_words() {
            assert_eq!(w, &w.to_lowercase());
        }
    }

    #[test]
    fn interrupt_poll_matches_barge_in_tick() {
        assert_eq!(DialogConfig::default().interrupt_poll_ms, 80);
    }
}
