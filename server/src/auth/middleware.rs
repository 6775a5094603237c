//! Authentication extractor.
//!
//! When `AUTH_SECRET` is configured every request must carry
//! `Authorization: Bearer <secret>`. Without it the relay is open.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Authenticated caller extracted from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthUser {
    /// Presented the shared secret.
    Token,
    /// No secret is configured.
    Anonymous,
}

impl AuthUser {
    /// Check an `Authorization` header value against the configured secret.
    pub fn verify(header: Option<&str>, secret: Option<&str>) -> Result<Self, AppError> {
        let Some(secret) = secret else {
            return Ok(AuthUser::Anonymous);
        };

        match header {
            Some(header) => {
                let token = header
                    .strip_prefix("Bearer ")
                    .ok_or(AppError::Unauthorized("Invalid authorization header format"))?;

                if token.is_empty() {
                    return Err(AppError::Unauthorized("Empty bearer token"));
                }
                if token != secret {
                    return Err(AppError::Unauthorized("Invalid bearer token"));
                }
                Ok(AuthUser::Token)
            }
            None => Err(AppError::Unauthorized("Missing authorization header")),
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let user = AuthUser::verify(header, state.config.auth_secret.as_deref());
        if let Err(ref err) = user {
            tracing::debug!(error = %err, "Rejected request");
        }
        user
    }
}
