//! API configuration.

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address, e.g. `0.0.0.0:8080`
    pub bind_addr: String,
    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
}

impl ApiConfig {
    pub fn from_env() -> ApiResult<Self> {
        Ok(Self {
            bind_addr: std::env::var("API_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            jwt_secret: std::env::var("API_JWT_SECRET")
                .map_err(|_| ApiError::internal("API_JWT_SECRET not set"))?,
        })
    }
}
