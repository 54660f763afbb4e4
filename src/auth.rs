// Optional Bearer token authentication middleware.
// If AUTH_SECRET is set, protected routes require `Authorization: Bearer <secret>`.
// If not set, auth is disabled (dev mode).

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Compare a presented Authorization header against the secret in constant time.
pub fn bearer_matches(header_value: Option<&str>, secret: &str) -> bool {
    match header_value.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token.as_bytes().ct_eq(secret.as_bytes()).into(),
        None => false,
    }
}

/// Middleware that enforces Bearer token auth when AUTH_SECRET is configured.
/// Public routes (health, readiness, auth status) do not use it.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(secret) = state.auth_secret.as_deref() else {
        return Ok(next.run(request).await);
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if bearer_matches(auth_header, secret) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(
            path = %request.uri().path(),
            has_header = auth_header.is_some(),
            "Auth failed: missing or invalid bearer token"
        );
        Err(StatusCode::UNAUTHORIZED)
    }
}
