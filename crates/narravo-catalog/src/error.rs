//! Catalog errors.

use thiserror::Error;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("uniqueness violation: {0}")]
    Conflict(String),

    #[error("business rule violated: {0}")]
    BusinessRule(String),

    #[error("concurrent update lost: {0}")]
    VersionMismatch(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("secret decryption failed: {0}")]
    Crypto(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl CatalogError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn business_rule(msg: impl Into<String>) -> Self {
        Self::BusinessRule(msg.into())
    }
}

impl From<redis::RedisError> for CatalogError {
    fn from(e: redis::RedisError) -> Self {
        CatalogError::Backend(e.to_string())
    }
}
