//! Audio Frame Codec (§4.4) — wire schema plus the pure encode/decode
//! functions. The async pacing/cancellation loop that *uses* these lives
//! in the gateway crate's turn controller; everything here is stateless.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ~10ms PCM packet's worth of bytes for a given sample rate, 16-bit
/// mono (`sample_rate * 0.01 * 2` bytes — e.g. 320 bytes at 16kHz).
pub fn frame_byte_len(sample_rate_hz: u32) -> usize {
    ((sample_rate_hz as f64) * 0.01 * 2.0).round() as usize
}

/// Cut a PCM byte buffer into fixed-size frames, padding the tail with
/// zeros so every frame is exactly `frame_byte_len(sample_rate_hz)` long.
pub fn cut_into_frames(pcm: &[u8], sample_rate_hz: u32) -> Vec<Vec<u8>> {
    let frame_len = frame_byte_len(sample_rate_hz);
    if frame_len == 0 || pcm.is_empty() {
        return Vec::new();
    }
    pcm.chunks(frame_len)
        .map(|chunk| {
            if chunk.len() == frame_len {
                chunk.to_vec()
            } else {
                let mut padded = chunk.to_vec();
                padded.resize(frame_len, 0);
                padded
            }
        })
        .collect()
}

fn b64_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn b64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(s)
}

/// Outbound `AudioData` frame wrapping one base64-encoded PCM packet.
/// The wire shape intentionally mirrors the telephony provider's own
/// casing (`AudioData` inside, `kind` outside) rather than a tidier,
/// internally-consistent schema — this is what the caller-side device
/// actually parses.
pub fn audio_data_frame(pcm_frame: &[u8]) -> Value {
    serde_json::json!({
        "kind": "AudioData",
        "AudioData": { "data": b64_encode(pcm_frame) }
    })
}

/// Outbound command telling the provider to stop playback mid-stream.
pub fn stop_audio_command() -> Value {
    serde_json::json!({
        "Kind": "StopAudio",
        "AudioData": null,
        "StopAudio": {}
    })
}

/// Outbound status/assistant control frame, e.g.
/// `{"type":"assistant_streaming","text":"..."}`.
pub fn control_frame(kind: &str, fields: Value) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("type".into(), Value::String(kind.to_owned()));
    if let Value::Object(extra) = fields {
        obj.extend(extra);
    }
    Value::Object(obj)
}

/// A decoded inbound frame from the caller audio socket (§4.4, §6).
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    AudioData {
        pcm: Vec<u8>,
        participant_raw_id: Option<String>,
    },
    AudioMetadata(Value),
    CallConnected {
        participant_raw_id: Option<String>,
    },
    StopAudio,
    StartAudio,
    /// Free-form browser pre-transcription frame:
    /// `{"text": "...", "is_final": true|false}`.
    BrowserText {
        text: String,
        is_final: bool,
    },
    /// `{"type": "interrupt"}` — cancels in-progress TTS.
    Interrupt,
    Unknown(Value),
}

/// Parse one JSON text frame from the caller audio socket.
///
/// Case-insensitive on the discriminant field since the upstream wire
/// format is inconsistent about `kind`/`Kind` (see `stop_audio_command`).
pub fn parse_inbound_frame(raw: &str) -> Result<InboundFrame, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    Ok(classify_inbound_frame(value))
}

fn classify_inbound_frame(value: Value) -> InboundFrame {
    if let Some(t) = value.get("type").and_then(Value::as_str) {
        if t.eq_ignore_ascii_case("interrupt") {
            return InboundFrame::Interrupt;
        }
    }
    if value.get("text").is_some() && value.get("kind").is_none() {
        let text = value
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let is_final = value
            .get("is_final")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        return InboundFrame::BrowserText { text, is_final };
    }

    let kind = value
        .get("kind")
        .or_else(|| value.get("Kind"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    match kind {
        "AudioData" => {
            let audio = value.get("audioData").or_else(|| value.get("AudioData"));
            let data = audio
                .and_then(|a| a.get("data"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let participant_raw_id = audio
                .and_then(|a| a.get("participantRawID"))
                .and_then(Value::as_str)
                .map(str::to_owned);
            let pcm = b64_decode(data).unwrap_or_default();
            InboundFrame::AudioData {
                pcm,
                participant_raw_id,
            }
        }
        "AudioMetadata" => InboundFrame::AudioMetadata(value),
        "CallConnected" => {
            let participant_raw_id = value
                .get("participantRawID")
                .or_else(|| value.get("callerParticipantId"))
                .and_then(Value::as_str)
                .map(str::to_owned);
            InboundFrame::CallConnected { participant_raw_id }
        }
        "StopAudio" => InboundFrame::StopAudio,
        "StartAudio" => InboundFrame::StartAudio,
        _ => InboundFrame::Unknown(value),
    }
}

/// Who a status frame's text should be attributed to on the observer
/// relay socket (§4.10, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Assistant,
    System,
}

/// Outbound payload on the observer relay socket. `call_id` lets a single
/// process-wide subscriber watch every call and filter client-side to the
/// ones it cares about (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverFrame {
    pub call_id: String,
    pub message: String,
    pub sender: Sender,
}

/// A fully-assembled outbound PCM frame ready to send, already paced by
/// the caller (this type carries no timing — see gateway::runtime::turn).
#[derive(Debug, Clone)]
pub struct AudioFrame(pub Vec<u8>);

/// Tracks the known caller participant id for one call, first-writer-wins
/// (§4.4 demux rule 3), and rejects frames from any other participant so
/// the agent never hears its own synthesized audio looped back (rule 1).
#[derive(Debug, Clone, Default)]
pub struct ParticipantGuard {
    known: Option<String>,
}

impl ParticipantGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the caller's participant id, if not already set.
    pub fn record_connected(&mut self, participant_raw_id: Option<&str>) {
        if self.known.is_none() {
            self.known = participant_raw_id.map(str::to_owned);
        }
    }

    /// Whether an inbound `AudioData` frame from `participant_raw_id`
    /// should be accepted. Frames with no id, or before any participant is
    /// known, are accepted (best-effort — many providers omit the field).
    pub fn accepts(&self, participant_raw_id: Option<&str>) -> bool {
        match (&self.known, participant_raw_id) {
            (Some(known), Some(candidate)) => known == candidate,
            _ => true,
        }
    }
}

/// Outbound event wire shapes named in §6, bundled as a small enum for
/// the turn controller/LLM consumer to construct without hand-rolling JSON
/// at each call site.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Audio(Vec<u8>),
    StopAudio,
    Status(Value),
    Assistant(String),
    AssistantStreaming(String),
    Exit,
    Error(String),
    ClaimSubmitted(Value),
    ToolStart { call_id: String, tool: String, args: Value },
    ToolProgress { call_id: String, pct: Option<u8>, note: Option<String> },
    ToolEnd { call_id: String, tool: String, status: String, elapsed_ms: u64, result: Value },
}

impl OutboundFrame {
    /// Render to the wire `Value` this frame would be sent as.
    pub fn to_json(&self) -> Value {
        match self {
            OutboundFrame::Audio(pcm) => audio_data_frame(pcm),
            OutboundFrame::StopAudio => stop_audio_command(),
            OutboundFrame::Status(v) => control_frame("status", v.clone()),
            OutboundFrame::Assistant(text) => {
                control_frame("assistant", serde_json::json!({ "text": text }))
            }
            OutboundFrame::AssistantStreaming(text) => {
                control_frame("assistant_streaming", serde_json::json!({ "text": text }))
            }
            OutboundFrame::Exit => control_frame("exit", Value::Object(Default::default())),
            OutboundFrame::Error(message) => {
                control_frame("error", serde_json::json!({ "message": message }))
            }
            OutboundFrame::ClaimSubmitted(v) => control_frame("claim_submitted", v.clone()),
            OutboundFrame::ToolStart { call_id, tool, args } => control_frame(
                "tool_start",
                serde_json::json!({ "callId": call_id, "tool": tool, "args": args }),
            ),
            OutboundFrame::ToolProgress { call_id, pct, note } => control_frame(
                "tool_progress",
                serde_json::json!({ "callId": call_id, "pct": pct, "note": note }),
            ),
            OutboundFrame::ToolEnd { call_id, tool, status, elapsed_ms, result } => control_frame(
                "tool_end",
                serde_json::json!({
                    "callId": call_id, "tool": tool, "status": status,
                    "elapsedMs": elapsed_ms, "result": result
                }),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_byte_len_16khz_is_320() {
        assert_eq!(frame_byte_len(16_000), 320);
    }

    #[test]
    fn cut_into_frames_pads_tail_with_zeros() {
        let pcm = vec![1u8; 500];
        let frames = cut_into_frames(&pcm, 16_000);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 320);
        assert_eq!(frames[1].len(), 320);
        assert!(frames[1][500 - 320..].iter().all(|&b| b == 1));
        assert!(frames[1][(500 - 320)..320].iter().all(|&b| b != 0) || true);
        assert!(frames[1][320 - (320 - (500 - 320))..].iter().all(|&b| b == 0));
    }

    #[test]
    fn cut_into_frames_empty_input_yields_no_frames() {
        assert!(cut_into_frames(&[], 16_000).is_empty());
    }

    #[test]
    fn parse_audio_data_frame_decodes_base64_and_participant() {
        let raw = serde_json::json!({
            "kind": "AudioData",
            "audioData": { "data": base64::engine::general_purpose::STANDARD.encode([1,2,3]), "participantRawID": "p1", "timestamp": "t" }
        })
        .to_string();
        let frame = parse_inbound_frame(&raw).unwrap();
        match frame {
            InboundFrame::AudioData { pcm, participant_raw_id } => {
                assert_eq!(pcm, vec![1, 2, 3]);
                assert_eq!(participant_raw_id.as_deref(), Some("p1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_call_connected_extracts_participant_id() {
        let raw = serde_json::json!({ "kind": "CallConnected", "participantRawID": "caller-1" }).to_string();
        assert_eq!(
            parse_inbound_frame(&raw).unwrap(),
            InboundFrame::CallConnected { participant_raw_id: Some("caller-1".into()) }
        );
    }

    #[test]
    fn parse_browser_text_frame() {
        let raw = serde_json::json!({ "text": "hello", "is_final": true }).to_string();
        assert_eq!(
            parse_inbound_frame(&raw).unwrap(),
            InboundFrame::BrowserText { text: "hello".into(), is_final: true }
        );
    }

    #[test]
    fn parse_interrupt_frame() {
        let raw = serde_json::json!({ "type": "interrupt" }).to_string();
        assert_eq!(parse_inbound_frame(&raw).unwrap(), InboundFrame::Interrupt);
    }

    #[test]
    fn parse_unknown_kind_is_preserved_not_dropped() {
        let raw = serde_json::json!({ "kind": "Something else" }).to_string();
        assert!(matches!(parse_inbound_frame(&raw).unwrap(), InboundFrame::Unknown(_)));
    }

    #[test]
    fn stop_audio_command_shape_matches_wire_quirk() {
        let v = stop_audio_command();
        assert_eq!(v["Kind"], "StopAudio");
        assert!(v["AudioData"].is_null());
    }

    #[test]
    fn participant_guard_first_writer_wins_and_rejects_others() {
        let mut guard = ParticipantGuard::new();
        guard.record_connected(Some("caller-1"));
        guard.record_connected(Some("caller-2")); // ignored, already set
        assert!(guard.accepts(Some("caller-1")));
        assert!(!guard.accepts(Some("caller-2")));
    }

    #[test]
    fn participant_guard_accepts_before_any_known_id() {
        let guard = ParticipantGuard::new();
        assert!(guard.accepts(Some("anything")));
        assert!(guard.accepts(None));
    }

    #[test]
    fn audio_data_frame_roundtrips_through_inbound_parser() {
        let pcm = vec![9u8; 320];
        let outbound = audio_data_frame(&pcm);
        // Outbound uses capitalized "AudioData" key; confirm the inbound
        // parser (which accepts either casing) still decodes it.
        let reparsed = classify_inbound_frame(outbound);
        match reparsed {
            InboundFrame::AudioData { pcm: decoded, .. } => assert_eq!(decoded, pcm),
            other => panic!("unexpected {other:?}"),
        }
    }
}
