//! Provider-agnostic request/response types and the core LLM trait (§4.9).

use va_domain::error::Result;
use va_domain::stream::{BoxStream, StreamEvent};
use va_domain::tool::{Message, ToolDefinition};

/// A provider-agnostic chat completion request, built from the session's
/// turn history translated to `Message`s plus the active tool catalog.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub model: Option<String>,
}

/// Trait every LLM adapter implements. The gateway only ever talks through
/// this seam; `OpenAiCompatProvider` is the one concrete adapter shipped.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stream a chat completion as a sequence of `StreamEvent`s (§4.9).
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this provider instance, for logging.
    fn provider_id(&self) -> &str;
}
