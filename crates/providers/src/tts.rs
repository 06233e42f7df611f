//! TTS adapter interface (§4.3) — external cloud text-to-speech boundary.
//!
//! Framing and pacing are not this layer's job; see `va_protocol::frames`
//! and the Turn Controller's send loop for that (§4.4).

use va_domain::error::Result;

/// Trait every text-to-speech adapter implements. Streamed playback and
/// in-memory synthesis are both exposed — callers pick the mode their
/// transport supports.
#[async_trait::async_trait]
pub trait TtsAdapter: Send + Sync {
    /// Start speaking `text` on a device the synthesizer owns directly.
    /// Returns immediately; playback happens out-of-band.
    async fn start_speaking_text(&self, text: &str) -> Result<()>;

    /// Cancel in-progress device playback.
    async fn stop_speaking(&self) -> Result<()>;

    /// Synthesize `text` to raw PCM (16 or 24 kHz, 16-bit mono), optionally
    /// wrapped in SSML with a rate prosody tag. On synthesis failure,
    /// returns an error rather than an empty buffer — callers that want the
    /// streamed-mode "empty buffer on failure" behavior check the error and
    /// substitute an empty `Vec` themselves.
    async fn synthesize_to_pcm(&self, text: &str, rate: &str) -> Result<Vec<u8>>;
}

/// An adapter that synthesizes silence — used wherever the real cloud
/// synthesizer isn't wired up. Keeps the framing/pacing/cancellation path
/// exercisable without a network dependency.
#[derive(Default)]
pub struct NoopTtsAdapter;

#[async_trait::async_trait]
impl TtsAdapter for NoopTtsAdapter {
    async fn start_speaking_text(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn stop_speaking(&self) -> Result<()> {
        Ok(())
    }

    async fn synthesize_to_pcm(&self, _text: &str, _rate: &str) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
