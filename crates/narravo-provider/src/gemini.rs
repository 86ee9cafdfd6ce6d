//! Gemini-style image provider.
//!
//! Gemini returns generated images inline as base64 parts rather than as
//! URLs; this adapter unwraps `candidates[0].content.parts[*].inlineData`
//! into the normalized [`ImageResult`].

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{classify_http_error, ProviderError, ProviderResult};
use crate::{ChatMessage, ChatOptions, ChatReply, ImageOptions, ImageResult, Provider, TtsOptions};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Image-only Gemini adapter.
pub struct GeminiImageProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiImageProvider {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

/// Pull the first inline image out of a generateContent response.
fn extract_inline_image(body: &str) -> ProviderResult<(Vec<u8>, String)> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("generateContent: {e}")))?;

    let inline = parsed
        .candidates
        .into_iter()
        .next()
        .into_iter()
        .flat_map(|c| c.content.parts)
        .find_map(|p| p.inline_data)
        .ok_or_else(|| {
            ProviderError::InvalidResponse("generateContent: no inlineData part".into())
        })?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| ProviderError::InvalidResponse(format!("inlineData base64: {e}")))?;
    Ok((bytes, inline.mime_type))
}

#[async_trait]
impl Provider for GeminiImageProvider {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        model: &str,
        _opts: &ChatOptions,
    ) -> ProviderResult<ChatReply> {
        Err(ProviderError::InvalidModel(format!(
            "gemini image adapter does not serve chat model {model}"
        )))
    }

    async fn image(
        &self,
        prompt: &str,
        model: &str,
        _opts: &ImageOptions,
    ) -> ProviderResult<ImageResult> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"responseModalities": ["TEXT", "IMAGE"]},
        });

        debug!(model, "gemini image request");
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_http_error(status, &text));
        }

        let (bytes, mime) = extract_inline_image(&text)?;
        Ok(ImageResult {
            bytes,
            mime,
            url: None,
        })
    }

    async fn tts(
        &self,
        _text: &str,
        _voice: &str,
        model: &str,
        _opts: &TtsOptions,
    ) -> ProviderResult<Vec<u8>> {
        Err(ProviderError::InvalidModel(format!(
            "gemini image adapter does not serve tts model {model}"
        )))
    }

    fn name(&self) -> &'static str {
        "gemini_image"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_inline_image_part() {
        let body = r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "here is your image"},
                        {"inlineData": {"mimeType": "image/png", "data": "aGVsbG8="}}
                    ]
                }
            }]
        }"#;
        let (bytes, mime) = extract_inline_image(body).unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(mime, "image/png");
    }

    #[test]
    fn missing_inline_data_is_an_error() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"no image"}]}}]}"#;
        assert!(extract_inline_image(body).is_err());
    }
}
