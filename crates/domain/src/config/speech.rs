use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// STT / TTS (external collaborators — interface + defaults only)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection details and tuning knobs for the cloud speech services.
/// §4.2 / §4.3: the recognizer and synthesizer themselves live outside
/// this gateway; this config is what the adapters need to talk to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "d_endpoint")]
    pub endpoint: String,
    /// Env var holding a static subscription key. If unset at runtime,
    /// the adapter falls back to a short-lived bearer token from ambient
    /// cloud credentials (§4.2).
    #[serde(default = "d_key_env")]
    pub key_env: String,
    /// Languages offered to continuous auto-language-id.
    #[serde(default = "d_languages")]
    pub recognized_languages: Vec<String>,
    /// Segmentation silence timeout, milliseconds. Spec default range 800–1300ms.
    #[serde(default = "d_silence_ms")]
    pub segmentation_silence_ms: u32,
    /// Input PCM sample rate, Hz (16kHz mono 16-bit per §4.2).
    #[serde(default = "d_sample_rate")]
    pub input_sample_rate_hz: u32,
    /// Output PCM sample rate, Hz (16 or 24kHz per §4.3).
    #[serde(default = "d_tts_sample_rate")]
    pub output_sample_rate_hz: u32,
    #[serde(default = "d_voice")]
    pub default_voice: String,
    /// SSML rate prosody tag applied when synthesizing, e.g. "1.0", "+10%".
    #[serde(default = "d_rate")]
    pub default_rate: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: d_endpoint(),
            key_env: d_key_env(),
            recognized_languages: d_languages(),
            segmentation_silence_ms: d_silence_ms(),
            input_sample_rate_hz: d_sample_rate(),
            output_sample_rate_hz: d_tts_sample_rate(),
            default_voice: d_voice(),
            default_rate: d_rate(),
        }
    }
}

fn d_endpoint() -> String {
    "https://eastus.api.cognitive.microsoft.com".into()
}
fn d_key_env() -> String {
    "VA_SPEECH_KEY".into()
}
fn d_languages() -> Vec<String> {
    vec!["en-US".into(), "es-ES".into()]
}
fn d_silence_ms() -> u32 {
    1000
}
fn d_sample_rate() -> u32 {
    16_000
}
fn d_tts_sample_rate() -> u32 {
    16_000
}
fn d_voice() -> String {
    "en-US-AvaNeural".into()
}
fn d_rate() -> String {
    "1.0".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_silence_timeout_is_within_spec_range() {
        let cfg = SpeechConfig::default();
        assert!((800..=1300).contains(&cfg.segmentation_silence_ms));
    }

    #[test]
    fn default_input_rate_is_16khz_mono() {
        assert_eq!(SpeechConfig::default().input_sample_rate_hz, 16_000);
    }
}
