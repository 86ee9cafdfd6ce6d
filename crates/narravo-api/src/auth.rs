//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs issued by the auth collaborator; the backend
//! only verifies the signature and reads the subject (user id).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use narravo_models::UserId;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Expiry (unix seconds)
    pub exp: usize,
}

/// Verify a token string against the configured secret.
pub fn verify_token(token: &str, secret: &str) -> Result<UserId, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ApiError::unauthorized(format!("invalid token: {e}")))?;
    Ok(UserId::from_string(data.claims.sub))
}

/// The authenticated caller, extracted from the `Authorization` header.
pub struct CurrentUser(pub UserId);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("expected Bearer token"))?;

        verify_token(token, &state.config.jwt_secret).map(CurrentUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(sub: &str, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_user() {
        let token = make_token("user-1", "s3cret");
        let user = verify_token(&token, "s3cret").unwrap();
        assert_eq!(user.as_str(), "user-1");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = make_token("user-1", "s3cret");
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(verify_token("not-a-jwt", "s3cret").is_err());
    }
}
