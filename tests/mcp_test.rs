// MCP endpoint integration tests: the real router, the in-memory store and a
// fixed clock.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use drive_mcp::config::Config;
use drive_mcp::confirmation::{ConfirmationToken, FixedClock};
use drive_mcp::state::{AppState, StoreBackend};
use drive_mcp::store::{InMemoryStore, Item, FOLDER_MIME, SPREADSHEET_MIME};

const T0: i64 = 1_700_000_000;
const SECRET: &str = "test-secret";

struct TestApp {
    app: axum::Router,
    store: Arc<InMemoryStore>,
    clock: Arc<FixedClock>,
}

fn config(backend: &str, secret: Option<&str>) -> Config {
    let backend = backend.to_string();
    let secret = secret.map(str::to_string);
    Config::from_lookup(move |key| match key {
        "STORE_BACKEND" => Some(backend.clone()),
        "AUTH_SECRET" => secret.clone(),
        "APP_HOST" => Some("https://drive.example.com".to_string()),
        _ => None,
    })
    .unwrap()
}

fn memory_app(secret: Option<&str>) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::new(T0));
    let state = AppState::with_parts(
        config("memory", secret),
        StoreBackend::Memory(store.clone()),
        clock.clone(),
    )
    .unwrap();
    TestApp {
        app: drive_mcp::create_router(state),
        store,
        clock,
    }
}

fn drive_app() -> (axum::Router, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(T0));
    let state = AppState::with_parts(config("drive", None), StoreBackend::Drive, clock.clone()).unwrap();
    (drive_mcp::create_router(state), clock)
}

fn seed(store: &InMemoryStore, id: &str, mime: &str) {
    store.insert(
        Item {
            id: id.into(),
            name: format!("{}-name", id),
            mime_type: mime.into(),
            size: None,
            parents: vec!["root".into()],
        },
        "",
    );
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post(app: &axum::Router, uri: &str, bearer: Option<&str>, body: Value) -> axum::response::Response {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    app.clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

async fn rpc(app: &axum::Router, method: &str, params: Value) -> Value {
    let response = post(
        app,
        "/mcp",
        Some(SECRET),
        json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

/// Call a tool and return (decoded payload, isError).
async fn call_tool(app: &axum::Router, name: &str, arguments: Value) -> (Value, bool) {
    let reply = rpc(app, "tools/call", json!({ "name": name, "arguments": arguments })).await;
    let result = &reply["result"];
    let text = result["content"][0]["text"].as_str().unwrap();
    let payload = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
    (payload, result["isError"].as_bool().unwrap())
}

// ═══════════════════════════════════════════════════════════════════════════
//  Auth
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn mcp_requires_bearer_when_secret_is_set() {
    let t = memory_app(Some(SECRET));
    let ping = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });

    let response = post(&t.app, "/mcp", None, ping.clone()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = post(&t.app, "/mcp", Some("wrong"), ping.clone()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = post(&t.app, "/mcp", Some(SECRET), ping).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn dev_mode_without_secret_needs_no_bearer() {
    let t = memory_app(None);
    let response = post(&t.app, "/mcp", None, json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" })).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ═══════════════════════════════════════════════════════════════════════════
//  JSON-RPC surface
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn initialize_and_list_tools() {
    let t = memory_app(Some(SECRET));

    let init = rpc(&t.app, "initialize", json!({})).await;
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["result"]["serverInfo"]["name"], "drive-mcp");

    let list = rpc(&t.app, "tools/list", json!({})).await;
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    for expected in [
        "delete_item",
        "delete_file",
        "delete_folder",
        "get_file_contents",
        "create_file",
        "edit_document",
        "add_rows_to_sheet",
        "edit_rows_of_sheet",
        "delete_rows_from_sheet",
    ] {
        assert!(names.contains(&expected), "missing tool {}", expected);
    }
}

#[tokio::test]
async fn protocol_errors() {
    let t = memory_app(Some(SECRET));

    let unknown = rpc(&t.app, "resources/list", json!({})).await;
    assert_eq!(unknown["error"]["code"], -32601);

    let nameless = rpc(&t.app, "tools/call", json!({ "arguments": {} })).await;
    assert_eq!(nameless["error"]["code"], -32602);

    let (text, is_error) = call_tool(&t.app, "no_such_tool", json!({})).await;
    assert!(is_error);
    assert_eq!(text, "Error: Unknown tool: no_such_tool");
}

// ═══════════════════════════════════════════════════════════════════════════
//  Confirmation gate end to end
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn two_step_deletion_scenario() {
    let t = memory_app(Some(SECRET));
    seed(&t.store, "F1", "text/plain");

    // Step 1: no token, nothing deleted.
    let (first, is_error) = call_tool(&t.app, "delete_file", json!({ "file_id": "F1" })).await;
    assert!(!is_error);
    assert_eq!(first["action"], "confirm_deletion");
    let token = first["confirmation_token"].as_str().unwrap().to_string();
    assert_eq!(ConfirmationToken::decode(&token).unwrap(), ConfirmationToken::new("F1", T0));
    assert_eq!(t.store.delete_calls(), 0);

    // Garbage token is refused without touching the store.
    let (garbage, is_error) = call_tool(
        &t.app,
        "delete_file",
        json!({ "file_id": "F1", "confirmation_token": "garbage!!" }),
    )
    .await;
    assert!(is_error);
    assert_eq!(garbage, json!({ "error": "Invalid confirmation token." }));
    assert_eq!(t.store.delete_calls(), 0);

    // Step 2 inside the window: exactly one delete.
    t.clock.advance(120);
    let (second, is_error) = call_tool(
        &t.app,
        "delete_file",
        json!({ "file_id": "F1", "confirmation_token": token }),
    )
    .await;
    assert!(!is_error);
    assert_eq!(second, json!({ "status": "success", "message": "File deleted successfully." }));
    assert_eq!(t.store.delete_calls(), 1);
    assert!(!t.store.contains("F1"));

    // Replay is not blocked; the store reports the item gone.
    let (replay, is_error) = call_tool(
        &t.app,
        "delete_file",
        json!({ "file_id": "F1", "confirmation_token": token }),
    )
    .await;
    assert!(is_error);
    assert_eq!(replay, json!({ "status": "error", "error": "File not found: F1." }));
    assert_eq!(t.store.delete_calls(), 2);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let t = memory_app(Some(SECRET));
    seed(&t.store, "D1", FOLDER_MIME);

    let (first, _) = call_tool(&t.app, "delete_folder", json!({ "folder_id": "D1" })).await;
    let token = first["confirmation_token"].as_str().unwrap().to_string();

    t.clock.advance(301);
    let (late, is_error) = call_tool(
        &t.app,
        "delete_folder",
        json!({ "folder_id": "D1", "confirmation_token": token }),
    )
    .await;
    assert!(is_error);
    assert_eq!(late["error"], "Confirmation token has expired. Please request a new token.");
    assert!(t.store.contains("D1"));
    assert_eq!(t.store.delete_calls(), 0);
}

#[tokio::test]
async fn token_is_bound_to_its_target() {
    let t = memory_app(Some(SECRET));
    seed(&t.store, "A", "text/plain");
    seed(&t.store, "B", "text/plain");

    let (first, _) = call_tool(&t.app, "delete_item", json!({ "item_id": "A" })).await;
    let token = first["confirmation_token"].as_str().unwrap().to_string();

    let (swapped, is_error) = call_tool(
        &t.app,
        "delete_item",
        json!({ "item_id": "B", "confirmation_token": token }),
    )
    .await;
    assert!(is_error);
    assert_eq!(
        swapped["error"],
        "Invalid confirmation token. Parameters do not match, please request a new token."
    );
    assert_eq!(swapped["details"]["token_params"]["target_id"], "A");
    assert_eq!(swapped["details"]["request_params"]["target_id"], "B");
    assert_eq!(t.store.delete_calls(), 0);
}

#[tokio::test]
async fn sheet_edits_over_mcp() {
    let t = memory_app(Some(SECRET));
    seed(&t.store, "S1", SPREADSHEET_MIME);

    let (added, is_error) = call_tool(
        &t.app,
        "add_rows_to_sheet",
        json!({ "sheet_id": "S1", "values": [["a", "b"], ["c", "d"]] }),
    )
    .await;
    assert!(!is_error);
    assert_eq!(added["message"], "Content added successfully.");

    let (deleted, is_error) = call_tool(
        &t.app,
        "delete_rows_from_sheet",
        json!({ "sheet_id": "S1", "row_indices": [1] }),
    )
    .await;
    assert!(!is_error);
    assert_eq!(deleted["message"], "Rows [1] deleted successfully.");

    let (read, _) = call_tool(&t.app, "get_file_contents", json!({ "file_id": "S1" })).await;
    assert_eq!(read["content"]["values"], json!([["c", "d"]]));
    // Row edits never go through the deletion gate.
    assert_eq!(t.store.delete_calls(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
//  Drive backend credentials
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn drive_tools_need_an_access_token() {
    let (app, _clock) = drive_app();

    let (payload, is_error) = call_tool(&app, "delete_file", json!({ "file_id": "F1" })).await;
    assert!(is_error);
    assert_eq!(
        payload,
        json!({
            "status": "error",
            "error": "Google Drive is not authenticated, provide an access token at https://drive.example.com/api/auth/token"
        })
    );
}

#[tokio::test]
async fn token_intake_status_and_logout() {
    let (app, clock) = drive_app();

    let status = app
        .clone()
        .oneshot(Request::builder().uri("/api/auth/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(status).await, json!({ "authenticated": false, "backend": "drive" }));

    let rejected = post(&app, "/api/auth/token", None, json!({ "access_token": "  " })).await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let stored = post(&app, "/api/auth/token", None, json!({ "access_token": "ya29.x", "expires_in": 3600 })).await;
    assert_eq!(stored.status(), StatusCode::OK);
    assert_eq!(body_json(stored).await["expires_at"], T0 + 3600);

    let status = app
        .clone()
        .oneshot(Request::builder().uri("/api/auth/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(status).await["authenticated"], true);

    // Inside the expiry buffer the token no longer counts.
    clock.advance(3600 - 30);
    let status = app
        .clone()
        .oneshot(Request::builder().uri("/api/auth/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(status).await["authenticated"], false);

    let logout = post(&app, "/api/auth/logout", None, json!({})).await;
    assert_eq!(logout.status(), StatusCode::OK);
    let status = app
        .oneshot(Request::builder().uri("/api/auth/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(status).await, json!({ "authenticated": false, "backend": "drive" }));
}
