//! Stored API keys for external AI providers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::id::{ApiKeyId, UserId};

/// Which provider family a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any endpoint speaking the OpenAI REST dialect
    OpenaiCompatible,
    Deepseek,
    Volcengine,
    Siliconflow,
    /// User-supplied base URL, OpenAI dialect
    Custom,
    /// Gemini-style image generation (inline base64 responses)
    GeminiImage,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenaiCompatible => "openai_compatible",
            ProviderKind::Deepseek => "deepseek",
            ProviderKind::Volcengine => "volcengine",
            ProviderKind::Siliconflow => "siliconflow",
            ProviderKind::Custom => "custom",
            ProviderKind::GeminiImage => "gemini_image",
        }
    }

    /// Default chat model when the caller does not pick one.
    pub fn default_chat_model(&self) -> &'static str {
        match self {
            ProviderKind::Deepseek => "deepseek-chat",
            ProviderKind::Volcengine => "doubao-pro",
            ProviderKind::Siliconflow => "deepseek-ai/DeepSeek-V3.1-Terminus",
            _ => "gpt-4o-mini",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" | "openai_compatible" => Ok(ProviderKind::OpenaiCompatible),
            "deepseek" => Ok(ProviderKind::Deepseek),
            "volcengine" => Ok(ProviderKind::Volcengine),
            "siliconflow" => Ok(ProviderKind::Siliconflow),
            "custom" => Ok(ProviderKind::Custom),
            "gemini" | "gemini_image" => Ok(ProviderKind::GeminiImage),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Key lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyStatus {
    #[default]
    Active,
    Inactive,
    Exhausted,
}

/// A user's provider credential.
///
/// Only the ciphertext is ever persisted; the gateway decrypts at the point
/// of use and the plaintext never leaves that call path.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub name: String,
    pub provider: ProviderKind,
    /// Base64 keystream ciphertext of the secret.
    pub secret_ciphertext: String,
    #[serde(default)]
    pub base_url: Option<String>,
    pub status: ApiKeyStatus,
    pub usage_count: u64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        provider: ProviderKind,
        secret_ciphertext: impl Into<String>,
        base_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ApiKeyId::new(),
            user_id,
            name: name.into(),
            provider,
            secret_ciphertext: secret_ciphertext.into(),
            base_url,
            status: ApiKeyStatus::Active,
            usage_count: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_usage(&mut self, calls: u64) {
        self.usage_count += calls;
        self.last_used_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_aliases() {
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenaiCompatible);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::GeminiImage);
        assert!("mystery".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn usage_accumulates() {
        let mut key = ApiKey::new(UserId::new(), "main", ProviderKind::Deepseek, "cipher", None);
        key.record_usage(3);
        key.record_usage(2);
        assert_eq!(key.usage_count, 5);
        assert!(key.last_used_at.is_some());
    }
}
