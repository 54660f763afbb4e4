//! MCP Server: exposes the Drive tools as an MCP endpoint.
//!
//! Supported methods:
//! - `initialize`: server info + capabilities
//! - `notifications/initialized`: client ack (no-op)
//! - `tools/list`: list all available tools
//! - `tools/call`: execute a tool
//! - `ping`: health check

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::handlers::APP_NAME;
use crate::state::AppState;
use crate::tools;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP JSON-RPC 2.0 endpoint handler.
#[utoipa::path(post, path = "/mcp", tag = "mcp",
    request_body = Value,
    responses(
        (status = 200, description = "JSON-RPC 2.0 response", body = Value),
        (status = 401, description = "Missing or invalid bearer token")
    )
)]
pub async fn mcp_handler(
    State(state): State<AppState>,
    Json(request): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
    let id = request.get("id").cloned().unwrap_or(Value::Null);

    tracing::debug!(method = %method, "MCP server: incoming request");

    let result = match method {
        "initialize" => handle_initialize(&id),
        "notifications/initialized" => {
            return (StatusCode::OK, Json(json!({})));
        }
        "ping" => handle_ping(&id),
        "tools/list" => handle_tools_list(&id),
        "tools/call" => handle_tools_call(&state, &request, &id).await,
        _ => json_rpc_error(id, -32601, &format!("Method not found: {}", method)),
    };

    (StatusCode::OK, Json(result))
}

// ── initialize ──────────────────────────────────────────────────────────────

fn handle_initialize(id: &Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": APP_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": "Google Drive tools. Deletions are two-step: call the delete tool without a confirmation_token, confirm with the user, then repeat the call with the returned token."
        }
    })
}

// ── ping ────────────────────────────────────────────────────────────────────

fn handle_ping(id: &Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {}
    })
}

// ── tools/list ──────────────────────────────────────────────────────────────

fn handle_tools_list(id: &Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "tools": build_mcp_tool_list()
        }
    })
}

// ── tools/call ──────────────────────────────────────────────────────────────

async fn handle_tools_call(state: &AppState, request: &Value, id: &Value) -> Value {
    let params = request.get("params").cloned().unwrap_or(json!({}));
    let tool_name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    if tool_name.is_empty() {
        return json_rpc_error(id.clone(), -32602, "Missing 'name' in params");
    }

    tracing::info!(tool = %tool_name, "MCP server: tools/call");

    match tools::execute_tool(tool_name, &arguments, state).await {
        Ok(payload) => {
            let is_error = payload.get("error").is_some();
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "content": [{ "type": "text", "text": payload.to_string() }],
                    "isError": is_error
                }
            })
        }
        Err(e) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "content": [{ "type": "text", "text": format!("Error: {}", e) }],
                "isError": true
            }
        }),
    }
}

// ── Tool list for MCP ───────────────────────────────────────────────────────

fn delete_schema(id_field: &str, what: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            id_field: { "type": "string", "description": format!("ID of the {} to delete", what) },
            "confirmation_token": { "type": "string", "description": "Token from the first call; omit it to request one" }
        },
        "required": [id_field]
    })
}

/// Build the MCP `tools/list` response.
pub fn build_mcp_tool_list() -> Vec<Value> {
    vec![
        mcp_tool("delete_item", "Permanently delete a file or folder. The first call returns a confirmation_token; confirm with the user, then call again with the token and the same item_id.", delete_schema("item_id", "file or folder")),
        mcp_tool("delete_file", "Permanently delete a file. Two-step: the first call returns a confirmation_token to send back with the same file_id.", delete_schema("file_id", "file")),
        mcp_tool("delete_folder", "Permanently delete a folder and everything in it. Two-step: the first call returns a confirmation_token to send back with the same folder_id.", delete_schema("folder_id", "folder")),
        mcp_tool("create_folder", "Create a folder, optionally inside a parent folder.", json!({
            "type": "object",
            "properties": {
                "folder_name": { "type": "string", "description": "Name of the new folder" },
                "parent_id": { "type": "string", "description": "Parent folder ID (root when omitted)" }
            },
            "required": ["folder_name"]
        })),
        mcp_tool("move_item", "Move a file or folder into another folder.", json!({
            "type": "object",
            "properties": {
                "item_id": { "type": "string", "description": "ID of the file or folder to move" },
                "new_parent_id": { "type": "string", "description": "ID of the destination folder" }
            },
            "required": ["item_id", "new_parent_id"]
        })),
        mcp_tool("search_items_by_name", "Find files and folders whose name matches exactly.", json!({
            "type": "object",
            "properties": { "name": { "type": "string", "description": "Exact name to search for" } },
            "required": ["name"]
        })),
        mcp_tool("get_item_details", "Metadata of a file or folder; folders also report how many items they contain.", json!({
            "type": "object",
            "properties": { "item_id": { "type": "string", "description": "ID of the file or folder" } },
            "required": ["item_id"]
        })),
        mcp_tool("list_folder_contents", "List the direct children of a folder with their type and extension.", json!({
            "type": "object",
            "properties": { "folder_id": { "type": "string", "description": "Folder ID (root when omitted)" } }
        })),
        mcp_tool("get_file_contents", "Read a file. Supports Google Docs, Google Sheets, plain text, JSON, CSV and PDF.", json!({
            "type": "object",
            "properties": { "file_id": { "type": "string", "description": "ID of the file" } },
            "required": ["file_id"]
        })),
        mcp_tool("create_document", "Create a Google Doc with the given text.", json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Document title" },
                "content": { "type": "string", "description": "Initial text" },
                "parent_folder_id": { "type": "string", "description": "Folder to create it in" }
            },
            "required": ["title", "content"]
        })),
        mcp_tool("create_spreadsheet", "Create a Google Sheet, optionally filled with rows.", json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Spreadsheet title" },
                "rows": rows_schema("Rows of cells"),
                "parent_folder_id": { "type": "string", "description": "Folder to create it in" }
            },
            "required": ["title"]
        })),
        mcp_tool("create_file", "Upload a new text, JSON or CSV file.", json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "File name" },
                "content": { "type": "string", "description": "File content" },
                "file_type": { "type": "string", "enum": ["text", "json", "csv"], "description": "Content format" },
                "parent_id": { "type": "string", "description": "Folder to create it in" }
            },
            "required": ["name", "content", "file_type"]
        })),
        mcp_tool("edit_document", "Insert text at the start of a Google Doc.", json!({
            "type": "object",
            "properties": {
                "document_id": { "type": "string", "description": "ID of the Google Doc" },
                "new_content": { "type": "string", "description": "Text to insert" }
            },
            "required": ["document_id", "new_content"]
        })),
        mcp_tool("add_rows_to_sheet", "Append rows to the first sheet of a Google Sheet.", json!({
            "type": "object",
            "properties": {
                "sheet_id": { "type": "string", "description": "ID of the spreadsheet" },
                "values": rows_schema("Rows to append")
            },
            "required": ["sheet_id", "values"]
        })),
        mcp_tool("edit_rows_of_sheet", "Overwrite cells of a Google Sheet, starting at the top-left cell of an A1 range.", json!({
            "type": "object",
            "properties": {
                "sheet_id": { "type": "string", "description": "ID of the spreadsheet" },
                "range_name": { "type": "string", "description": "A1 range, e.g. 'Sheet1!A1:B2'" },
                "values": rows_schema("Replacement rows")
            },
            "required": ["sheet_id", "range_name", "values"]
        })),
        mcp_tool("delete_rows_from_sheet", "Delete rows from the first sheet of a Google Sheet.", json!({
            "type": "object",
            "properties": {
                "sheet_id": { "type": "string", "description": "ID of the spreadsheet" },
                "row_indices": {
                    "type": "array",
                    "description": "Row numbers to delete (1-based)",
                    "items": { "type": "integer", "minimum": 1 }
                }
            },
            "required": ["sheet_id", "row_indices"]
        })),
    ]
}

fn rows_schema(description: &str) -> Value {
    json!({
        "type": "array",
        "description": description,
        "items": { "type": "array", "items": { "type": ["string", "number", "boolean", "null"] } }
    })
}

/// Helper to build a single MCP tool object.
fn mcp_tool(name: &str, description: &str, input_schema: Value) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": input_schema,
    })
}

// ── JSON-RPC error helper ───────────────────────────────────────────────────

fn json_rpc_error(id: Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}
