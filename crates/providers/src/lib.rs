pub mod auth;
pub mod openai_compat;
pub mod stt;
pub mod tts;
pub mod traits;
pub(crate) mod sse;
pub(crate) mod util;

pub use openai_compat::OpenAiCompatProvider;
pub use stt::{
    AudioFormat, NoopSttAdapter, NoopSttAdapterFactory, NoopSttSink, SttAdapter, SttAdapterFactory, SttParams,
    SttSink,
};
pub use traits::{ChatRequest, LlmProvider};
pub use tts::{NoopTtsAdapter, TtsAdapter};
