//! Caller credential extractor.

use crate::errors::AppError;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

const BEARER_PREFIX: &str = "Bearer ";

/// The raw token from an `Authorization: Bearer <token>` header.
///
/// The token is not validated here. Handlers forward it unchanged to
/// downstream services that act on behalf of the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("Malformed Authorization header".to_string()))?;

        match header.strip_prefix(BEARER_PREFIX) {
            Some(token) if !token.trim().is_empty() => Ok(BearerToken(token.trim().to_string())),
            _ => Err(AppError::Unauthorized(
                "Expected a Bearer token".to_string(),
            )),
        }
    }
}
