pub mod audit;
pub mod auth;
pub mod config;
pub mod confirmation;
pub mod content;
pub mod handlers;
pub mod mcp;
pub mod models;
pub mod oauth;
pub mod session;
pub mod state;
pub mod store;
pub mod tools;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "drive-mcp", description = "MCP tool server for Google Drive with confirmed deletions"),
    paths(
        handlers::health,
        handlers::readiness,
        oauth::auth_status,
        oauth::set_token,
        oauth::auth_logout,
        mcp::server::mcp_handler,
    ),
    components(schemas(models::HealthResponse, models::TokenRequest)),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "auth", description = "Google access token intake"),
        (name = "mcp", description = "JSON-RPC 2.0 tool endpoint"),
    )
)]
pub struct ApiDoc;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/mcp", post(mcp::server::mcp_handler))
        .route("/api/auth/token", post(oauth::set_token))
        .route("/api/auth/logout", post(oauth::auth_logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        // Health
        .route("/api/health", get(handlers::health))
        .route("/api/health/ready", get(handlers::readiness))
        // Credential status is public, changing it is not
        .route("/api/auth/status", get(oauth::auth_status))
        .merge(protected)
        .with_state(state)
}
