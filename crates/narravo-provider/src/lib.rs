//! Provider gateway: a uniform async capability surface over external
//! LLM / image / TTS providers.
//!
//! The gateway wraps a provider adapter with a per-key concurrency permit
//! and a rate-limit retry policy. Adapters normalize provider-specific
//! responses (notably Gemini-style inline image payloads) so downstream
//! code never branches on the provider family.

pub mod backoff;
pub mod error;
pub mod gateway;
pub mod gemini;
pub mod openai;

pub use backoff::RetryPolicy;
pub use error::{ProviderError, ProviderResult};
pub use gateway::ProviderGateway;
pub use gemini::GeminiImageProvider;
pub use openai::OpenAiCompatibleProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Options for a chat completion call.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
    pub max_tokens: Option<u32>,
}

/// Reply from a chat completion.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub message: String,
}

/// Options for an image generation call.
#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
    /// `"WxH"` hint, provider permitting.
    pub size: Option<String>,
}

/// Normalized image output: always bytes + mime, URL kept when the
/// provider returned one.
#[derive(Debug, Clone)]
pub struct ImageResult {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub url: Option<String>,
}

/// Options for a TTS call.
#[derive(Debug, Clone, Default)]
pub struct TtsOptions {
    pub speed: Option<f64>,
    /// Output container, e.g. `"mp3"`.
    pub format: Option<String>,
}

/// Uniform provider capability surface.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        opts: &ChatOptions,
    ) -> ProviderResult<ChatReply>;

    async fn image(
        &self,
        prompt: &str,
        model: &str,
        opts: &ImageOptions,
    ) -> ProviderResult<ImageResult>;

    async fn tts(
        &self,
        text: &str,
        voice: &str,
        model: &str,
        opts: &TtsOptions,
    ) -> ProviderResult<Vec<u8>>;

    /// Adapter name for logging.
    fn name(&self) -> &'static str;
}
