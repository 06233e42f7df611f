//! STT adapter interface (§4.2) — external cloud speech-to-text boundary.
//!
//! The adapter runs its own recognition worker and invokes sink callbacks,
//! possibly from a different thread than the Turn Controller; it owns no
//! session state itself. `SttAdapterFactory` mints one `SttAdapter` per
//! call (§4.2: "per-session instance") rather than sharing a single
//! recognizer across every concurrent call.

use std::sync::Arc;

use va_domain::error::Result;

/// Audio format the adapter accepts via `write_bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioFormat {
    Pcm16kHz16BitMono,
    Pcm24kHz16BitMono,
    /// An opaque compressed container, named by codec (e.g. `"opus"`).
    Opaque(String),
}

/// Construction parameters for an STT session (§4.2).
#[derive(Debug, Clone)]
pub struct SttParams {
    pub recognized_languages: Vec<String>,
    pub segmentation_silence_ms: u64,
    pub audio_format: AudioFormat,
}

/// Callbacks the adapter invokes as recognition progresses. For each
/// recognized utterance: zero or more `partial` calls precede exactly one
/// `final_result` or `cancel` call.
pub trait SttSink: Send + Sync {
    fn partial(&self, text: &str, lang: &str);
    fn final_result(&self, text: &str, lang: &str);
    fn cancel(&self, reason: &str);
}

/// A sink that drops every callback. Used by readiness pings and tests
/// that only need to prove `start`/`stop` round-trip cleanly.
#[derive(Default)]
pub struct NoopSttSink;

impl SttSink for NoopSttSink {
    fn partial(&self, _text: &str, _lang: &str) {}
    fn final_result(&self, _text: &str, _lang: &str) {}
    fn cancel(&self, _reason: &str) {}
}

/// Trait every speech-to-text adapter implements. `start` wires the
/// adapter to its sink before any audio flows; the adapter drives the sink
/// from its own recognition worker for the lifetime of the call.
#[async_trait::async_trait]
pub trait SttAdapter: Send + Sync {
    async fn start(&self, sink: Arc<dyn SttSink>) -> Result<()>;
    async fn write_bytes(&self, frame: &[u8]) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Mints one `SttAdapter` per call so concurrent calls never share
/// recognizer state (§4.2).
#[async_trait::async_trait]
pub trait SttAdapterFactory: Send + Sync {
    async fn create(&self, params: SttParams) -> Result<Arc<dyn SttAdapter>>;
}

/// An adapter that accepts frames and never recognizes anything — used
/// wherever the real cloud recognizer isn't wired up. The caller-audio
/// path still exercises the demux/participant-filter/push pipeline; only
/// the callback side is inert.
#[derive(Default)]
pub struct NoopSttAdapter;

#[async_trait::async_trait]
impl SttAdapter for NoopSttAdapter {
    async fn start(&self, _sink: Arc<dyn SttSink>) -> Result<()> {
        Ok(())
    }

    async fn write_bytes(&self, _frame: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory for [`NoopSttAdapter`] — a fresh no-op instance per call, same
/// as a real factory would mint a fresh recognizer session per call.
#[derive(Default)]
pub struct NoopSttAdapterFactory;

#[async_trait::async_trait]
impl SttAdapterFactory for NoopSttAdapterFactory {
    async fn create(&self, _params: SttParams) -> Result<Arc<dyn SttAdapter>> {
        Ok(Arc::new(NoopSttAdapter))
    }
}
