//! Call-control cloud-event envelope types consumed by the Call Event
//! Processor (§4.5) and the `result-information` blob carried by
//! call-control HTTP errors (§7).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed set of call-control event types the processor dispatches on.
/// Anything outside this set is handled as `Unknown` (logged, dropped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CallControlEventType {
    CallConnected,
    CallDisconnected,
    CreateCallFailed,
    AnswerCallFailed,
    ParticipantsUpdated,
    RecognizeDtmfToneReceived,
    RecognizeFailed,
    RecognizeCompleted,
    PlayCompleted,
    PlayFailed,
    PlayCanceled,
    #[serde(other)]
    Unknown,
}

/// The `resultInformation` blob carried by several call-control events and
/// by call-control HTTP error responses (§7): code/subcode plus a message,
/// used to decide whether a failure is worth a targeted recovery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultInformation {
    pub code: i32,
    pub subcode: Option<u32>,
    pub message: String,
}

impl ResultInformation {
    /// Subcode 8581 is the known-transient "transcription stalled" failure
    /// the spec calls out for targeted recovery (§7, §D).
    pub fn is_recoverable_transcription_stall(&self) -> bool {
        self.subcode == Some(8581)
    }
}

/// One parsed call-control cloud event, reduced to the fields the
/// processor and its handlers need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallControlEvent {
    #[serde(rename = "type")]
    pub event_type: CallControlEventType,
    pub call_connection_id: String,
    #[serde(default)]
    pub participant_raw_id: Option<String>,
    #[serde(default)]
    pub dtmf_tone: Option<String>,
    #[serde(default)]
    pub result_information: Option<ResultInformation>,
    #[serde(default)]
    pub raw: Option<Value>,
}

impl CallControlEvent {
    /// Parse a single cloud-event envelope. Unrecognized `type` values
    /// deserialize to `CallControlEventType::Unknown` rather than erroring,
    /// so the processor can log-and-drop instead of rejecting the batch.
    pub fn parse(raw: &Value) -> Result<Self, serde_json::Error> {
        let mut event: CallControlEvent = serde_json::from_value(raw.clone())?;
        event.raw = Some(raw.clone());
        Ok(event)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self.event_type, CallControlEventType::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connected_event() {
        let raw = serde_json::json!({
            "type": "CallConnected",
            "callConnectionId": "call-1"
        });
        let event = CallControlEvent::parse(&raw).unwrap();
        assert_eq!(event.event_type, CallControlEventType::CallConnected);
        assert_eq!(event.call_connection_id, "call-1");
        assert!(event.is_known());
    }

    #[test]
    fn unknown_event_type_is_dropped_not_erroring() {
        let raw = serde_json::json!({
            "type": "SomeFutureEventType",
            "callConnectionId": "call-2"
        });
        let event = CallControlEvent::parse(&raw).unwrap();
        assert!(!event.is_known());
    }

    #[test]
    fn recognize_failed_carries_result_information() {
        let raw = serde_json::json!({
            "type": "RecognizeFailed",
            "callConnectionId": "call-3",
            "resultInformation": { "code": 400, "subcode": 8581, "message": "stalled" }
        });
        let event = CallControlEvent::parse(&raw).unwrap();
        let info = event.result_information.unwrap();
        assert!(info.is_recoverable_transcription_stall());
    }

    #[test]
    fn dtmf_received_carries_tone() {
        let raw = serde_json::json!({
            "type": "RecognizeDtmfToneReceived",
            "callConnectionId": "call-4",
            "dtmfTone": "3"
        });
        let event = CallControlEvent::parse(&raw).unwrap();
        assert_eq!(event.dtmf_tone.as_deref(), Some("3"));
    }
}
