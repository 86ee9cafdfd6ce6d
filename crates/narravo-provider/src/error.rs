//! Provider error taxonomy.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Canonical classification of provider failures.
///
/// `RateLimited` is what the gateway returns after its retry budget is
/// exhausted; everything else propagates to the calling stage without
/// gateway-level retries.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited after retry exhaustion")]
    RateLimited,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider internal error: {0}")]
    ProviderInternal(String),

    #[error("unparseable provider response: {0}")]
    InvalidResponse(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Only rate limiting is retried by the gateway.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimited)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Transport(e.to_string())
    }
}

/// Map an HTTP status + body to the canonical error kind.
pub(crate) fn classify_http_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let summary: String = body.chars().take(300).collect();
    match status.as_u16() {
        429 => ProviderError::RateLimited,
        401 | 403 => ProviderError::AuthFailed(summary),
        404 => ProviderError::InvalidModel(summary),
        400 if body.contains("model") => ProviderError::InvalidModel(summary),
        500..=599 => ProviderError::ProviderInternal(summary),
        _ => ProviderError::ProviderInternal(format!("HTTP {status}: {summary}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn classification_matches_contract() {
        assert!(matches!(
            classify_http_error(StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::RateLimited
        ));
        assert!(matches!(
            classify_http_error(StatusCode::UNAUTHORIZED, "bad key"),
            ProviderError::AuthFailed(_)
        ));
        assert!(matches!(
            classify_http_error(StatusCode::NOT_FOUND, "no such model"),
            ProviderError::InvalidModel(_)
        ));
        assert!(matches!(
            classify_http_error(StatusCode::BAD_REQUEST, "unknown model xyz"),
            ProviderError::InvalidModel(_)
        ));
        assert!(matches!(
            classify_http_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            ProviderError::ProviderInternal(_)
        ));
    }
}
