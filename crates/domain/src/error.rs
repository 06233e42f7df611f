/// Shared error type used across all voice-agent-gateway crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("KV timeout after {0}ms")]
    KvTimeout(u64),

    #[error("KV: {0}")]
    Kv(String),

    #[error("STT: {0}")]
    Stt(String),

    #[error("TTS: {0}")]
    Tts(String),

    #[error("LLM stream: {0}")]
    LlmStream(String),

    #[error("call-control {code}/{subcode:?}: {message}")]
    CallControl {
        code: u32,
        subcode: Option<u32>,
        message: String,
    },

    #[error("tool {name} parse error: {0}", name = .name)]
    ToolArgsInvalid { name: String, message: String },

    #[error("tool {name} failed: {message}")]
    ToolFailed { name: String, message: String },

    #[error("socket send failed: {0}")]
    SocketSend(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
