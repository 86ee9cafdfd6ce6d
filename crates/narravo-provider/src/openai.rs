//! Adapter for providers speaking the OpenAI REST dialect.
//!
//! DeepSeek, Volcengine (Ark), Siliconflow and user-configured custom
//! endpoints all expose this dialect; only the base URL differs.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use narravo_models::ProviderKind;

use crate::error::{classify_http_error, ProviderError, ProviderResult};
use crate::{ChatMessage, ChatOptions, ChatReply, ImageOptions, ImageResult, Provider, TtsOptions};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
const VOLCENGINE_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
const SILICONFLOW_BASE_URL: &str = "https://api.siliconflow.cn/v1";

/// OpenAI-dialect provider adapter.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    name: &'static str,
}

impl OpenAiCompatibleProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            name: "openai_compatible",
        }
    }

    /// Build an adapter for a provider family, honoring an override base URL.
    pub fn for_kind(kind: ProviderKind, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        let (default_base, name) = match kind {
            ProviderKind::Deepseek => (DEEPSEEK_BASE_URL, "deepseek"),
            ProviderKind::Volcengine => (VOLCENGINE_BASE_URL, "volcengine"),
            ProviderKind::Siliconflow => (SILICONFLOW_BASE_URL, "siliconflow"),
            ProviderKind::Custom => (SILICONFLOW_BASE_URL, "custom"),
            _ => (OPENAI_BASE_URL, "openai_compatible"),
        };
        let mut adapter = Self::new(api_key, base_url.unwrap_or_else(|| default_base.to_string()));
        adapter.name = name;
        adapter
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> ProviderResult<String> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_http_error(status, &text));
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
    b64_json: Option<String>,
}

fn parse_chat_response(body: &str) -> ProviderResult<ChatReply> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("chat completion: {e}")))?;
    let message = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    Ok(ChatReply { message })
}

fn parse_image_response(body: &str) -> ProviderResult<ImageDatum> {
    let parsed: ImageGenerationResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("image generation: {e}")))?;
    parsed
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("image generation: empty data array".into()))
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        opts: &ChatOptions,
    ) -> ProviderResult<ChatReply> {
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(t) = opts.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = opts.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if opts.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        debug!(provider = self.name, model, "chat completion request");
        let text = self.post_json("chat/completions", body).await?;
        parse_chat_response(&text)
    }

    async fn image(
        &self,
        prompt: &str,
        model: &str,
        opts: &ImageOptions,
    ) -> ProviderResult<ImageResult> {
        let mut body = json!({
            "model": model,
            "prompt": prompt,
        });
        if let Some(ref size) = opts.size {
            body["size"] = json!(size);
        }

        debug!(provider = self.name, model, "image generation request");
        let text = self.post_json("images/generations", body).await?;
        let datum = parse_image_response(&text)?;

        if let Some(b64) = datum.b64_json {
            use base64::Engine;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(b64.as_bytes())
                .map_err(|e| ProviderError::InvalidResponse(format!("image base64: {e}")))?;
            return Ok(ImageResult {
                bytes,
                mime: "image/png".into(),
                url: datum.url,
            });
        }

        // URL-only response: fetch the bytes so downstream never branches.
        let url = datum.url.ok_or_else(|| {
            ProviderError::InvalidResponse("image generation: neither url nor b64_json".into())
        })?;
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!(
                "image download failed: HTTP {status}"
            )));
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        Ok(ImageResult {
            bytes,
            mime,
            url: Some(url),
        })
    }

    async fn tts(
        &self,
        text: &str,
        voice: &str,
        model: &str,
        opts: &TtsOptions,
    ) -> ProviderResult<Vec<u8>> {
        let mut body = json!({
            "model": model,
            "voice": voice,
            "input": text,
        });
        if let Some(speed) = opts.speed {
            body["speed"] = json!(speed);
        }
        if let Some(ref format) = opts.format {
            body["response_format"] = json!(format);
        }

        debug!(provider = self.name, model, voice, "tts request");
        let response = self
            .client
            .post(self.url("audio/speech"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &text));
        }
        Ok(response.bytes().await?.to_vec())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_extracts_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"你好"}}]}"#;
        let reply = parse_chat_response(body).unwrap();
        assert_eq!(reply.message, "你好");
    }

    #[test]
    fn chat_response_tolerates_null_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let reply = parse_chat_response(body).unwrap();
        assert!(reply.message.is_empty());
    }

    #[test]
    fn image_response_prefers_b64() {
        let body = r#"{"data":[{"b64_json":"aGk=","url":null}]}"#;
        let datum = parse_image_response(body).unwrap();
        assert_eq!(datum.b64_json.as_deref(), Some("aGk="));
    }

    #[test]
    fn image_response_rejects_empty_data() {
        assert!(parse_image_response(r#"{"data":[]}"#).is_err());
    }

    #[test]
    fn for_kind_picks_base_urls() {
        let p = OpenAiCompatibleProvider::for_kind(ProviderKind::Deepseek, "k", None);
        assert_eq!(p.base_url, DEEPSEEK_BASE_URL);
        let p = OpenAiCompatibleProvider::for_kind(
            ProviderKind::Custom,
            "k",
            Some("https://llm.example.com/v1/".into()),
        );
        assert_eq!(p.base_url, "https://llm.example.com/v1");
    }

    mod http {
        use super::super::*;
        use crate::Provider;
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        #[tokio::test]
        async fn chat_round_trip() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .and(header("authorization", "Bearer sk-test"))
                .respond_with(ResponseTemplate::new(200).set_body_raw(
                    r#"{"choices":[{"message":{"role":"assistant","content":"一幅画"}}]}"#,
                    "application/json",
                ))
                .mount(&server)
                .await;

            let provider = OpenAiCompatibleProvider::new("sk-test", server.uri());
            let reply = provider
                .chat(
                    &[ChatMessage::user("写个提示词")],
                    "deepseek-chat",
                    &ChatOptions::default(),
                )
                .await
                .unwrap();
            assert_eq!(reply.message, "一幅画");
        }

        #[tokio::test]
        async fn http_429_maps_to_rate_limited() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .respond_with(ResponseTemplate::new(429))
                .mount(&server)
                .await;

            let provider = OpenAiCompatibleProvider::new("sk-test", server.uri());
            let err = provider
                .chat(
                    &[ChatMessage::user("hi")],
                    "deepseek-chat",
                    &ChatOptions::default(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ProviderError::RateLimited));
        }

        #[tokio::test]
        async fn tts_returns_raw_bytes() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/audio/speech"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_bytes(b"ID3-mp3-bytes".to_vec()),
                )
                .mount(&server)
                .await;

            let provider = OpenAiCompatibleProvider::new("sk-test", server.uri());
            let bytes = provider
                .tts("你好", "alloy", "tts-1", &TtsOptions::default())
                .await
                .unwrap();
            assert_eq!(bytes, b"ID3-mp3-bytes");
        }
    }
}
