use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
};
use std::sync::Arc;

use crate::api::response::{api_error, error_response, ApiError};
use crate::model::UserContext;
use crate::store::traits::Store;

/// Axum extractor resolving the caller's `UserContext` from a bearer token
///
/// The token in `Authorization: Bearer <token>` is looked up through the
/// store's session table. Missing, malformed or expired tokens are rejected
/// with 401.
#[async_trait]
impl<S> FromRequestParts<Arc<S>> for UserContext
where
    S: Store + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<S>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_bearer_token(&parts.headers) else {
            log::warn!("Rejected request to {}: missing bearer token", parts.uri.path());
            return Err(api_error(StatusCode::UNAUTHORIZED, "Missing bearer token"));
        };

        match state.resolve_session(&token).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                log::warn!("Rejected request to {}: unknown or expired session", parts.uri.path());
                Err(api_error(
                    StatusCode::UNAUTHORIZED,
                    "Session is invalid or has expired",
                ))
            }
            Err(e) => Err(error_response(e)),
        }
    }
}

/// Extract the token from an `Authorization: Bearer` header
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
