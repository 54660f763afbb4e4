// Google access-token intake and per-call session resolution.
//
// The server never runs an OAuth flow itself: an access token arrives via the
// GOOGLE_ACCESS_TOKEN env var or POST /api/auth/token and is held in runtime
// state until it expires or is cleared. Refreshing is the caller's business.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::handlers::ApiError;
use crate::models::TokenRequest;
use crate::session::Session;
use crate::state::{AppState, GoogleCredential, StoreBackend};
use crate::store::DriveStore;
use crate::tools::ToolError;

/// Tokens closer than this to expiry are treated as already expired.
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

fn is_usable(credential: &GoogleCredential, now: i64) -> bool {
    match credential.expires_at {
        Some(expires_at) => now < expires_at.saturating_sub(TOKEN_EXPIRY_BUFFER_SECS),
        None => true,
    }
}

/// Current access token, if one is held and not (nearly) expired.
pub async fn current_access_token(state: &AppState) -> Option<String> {
    let rt = state.runtime.read().await;
    let credential = rt.google.as_ref()?;
    if !is_usable(credential, state.clock.now()) {
        tracing::debug!(expires_at = ?credential.expires_at, "Google access token expired");
        return None;
    }
    Some(credential.access_token.clone())
}

/// Build the session a tool call runs in.
pub async fn resolve_session(state: &AppState) -> Result<Session, ToolError> {
    match &state.backend {
        StoreBackend::Memory(store) => Ok(Session::new(store.clone(), "memory")),
        StoreBackend::Drive => {
            let token = current_access_token(state)
                .await
                .ok_or_else(|| ToolError::Unauthenticated(state.config.app_host.clone()))?;
            let config = &state.config;
            let store = DriveStore::new(state.client.clone(), &config.drive_api_base, token)?
                .with_editor_bases(&config.docs_api_base, &config.sheets_api_base)?;
            Ok(Session::new(Arc::new(store), "google"))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Handlers
// ═══════════════════════════════════════════════════════════════════════

/// GET /api/auth/status
#[utoipa::path(get, path = "/api/auth/status", tag = "auth",
    responses((status = 200, description = "Credential status", body = Value))
)]
pub async fn auth_status(State(state): State<AppState>) -> Json<Value> {
    let backend = state.backend.kind().as_str();
    if let StoreBackend::Memory(_) = state.backend {
        return Json(json!({ "authenticated": true, "backend": backend }));
    }

    let rt = state.runtime.read().await;
    match rt.google.as_ref() {
        Some(credential) => Json(json!({
            "authenticated": is_usable(credential, state.clock.now()),
            "backend": backend,
            "expires_at": credential.expires_at,
        })),
        None => Json(json!({ "authenticated": false, "backend": backend })),
    }
}

/// POST /api/auth/token: hand the server a Google access token
#[utoipa::path(post, path = "/api/auth/token", tag = "auth",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token stored", body = Value),
        (status = 400, description = "Empty token or non-positive lifetime")
    )
)]
pub async fn set_token(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<Value>, ApiError> {
    let access_token = body.access_token.trim().to_string();
    if access_token.is_empty() {
        return Err(ApiError::BadRequest("access_token must not be empty".into()));
    }
    let expires_at = match body.expires_in {
        Some(secs) if secs <= 0 => {
            return Err(ApiError::BadRequest("expires_in must be positive".into()));
        }
        Some(secs) => Some(state.clock.now().saturating_add(secs)),
        None => None,
    };

    state.runtime.write().await.google = Some(GoogleCredential {
        access_token,
        expires_at,
    });
    tracing::info!(expires_at = ?expires_at, "Google access token stored");

    Ok(Json(json!({ "status": "ok", "expires_at": expires_at })))
}

/// POST /api/auth/logout: forget the held access token
#[utoipa::path(post, path = "/api/auth/logout", tag = "auth",
    responses((status = 200, description = "Token cleared", body = Value))
)]
pub async fn auth_logout(State(state): State<AppState>) -> Json<Value> {
    let had_token = state.runtime.write().await.google.take().is_some();
    tracing::info!(had_token, "Google access token cleared");
    Json(json!({ "status": "ok" }))
}
