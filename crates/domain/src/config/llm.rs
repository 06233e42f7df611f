use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM endpoint (external collaborator — interface + defaults only)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection details for the external LLM chat endpoint.
///
/// The endpoint itself is out of scope for this gateway (§1 Non-goals);
/// this config only carries what the LLM Streaming Consumer needs to
/// open a request against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Env var holding the bearer credential. Never logged.
    #[serde(default = "d_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_top_p")]
    pub top_p: f32,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    /// Ceiling on one streaming chat request, per §5.
    #[serde(default = "d_stream_ceiling_sec")]
    pub stream_ceiling_sec: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_key_env(),
            model: d_model(),
            temperature: d_temperature(),
            top_p: d_top_p(),
            max_tokens: d_max_tokens(),
            stream_ceiling_sec: d_stream_ceiling_sec(),
        }
    }
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_key_env() -> String {
    "VA_LLM_API_KEY".into()
}
fn d_model() -> String {
    "gpt-4o".into()
}
fn d_temperature() -> f32 {
    0.5
}
fn d_top_p() -> f32 {
    1.0
}
fn d_max_tokens() -> u32 {
    4096
}
fn d_stream_ceiling_sec() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_numeric_parameters() {
        let cfg = LlmConfig::default();
        assert!((cfg.temperature - 0.5).abs() < f32::EPSILON);
        assert!((cfg.top_p - 1.0).abs() < f32::EPSILON);
        assert_eq!(cfg.max_tokens, 4096);
        assert_eq!(cfg.stream_ceiling_sec, 30);
    }
}
