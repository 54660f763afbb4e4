//! Tool execution for the MCP endpoint.
//!
//! Drive tools callable over `tools/call`:
//! - `delete_item` / `delete_file` / `delete_folder`: two-step confirmed deletion
//! - `create_folder`, `move_item`
//! - `search_items_by_name`, `get_item_details`, `list_folder_contents`
//! - `get_file_contents`
//! - `create_document`, `create_spreadsheet`, `create_file`
//! - `edit_document`, `add_rows_to_sheet`, `edit_rows_of_sheet`, `delete_rows_from_sheet`
//!
//! Tools answer with a JSON payload. Failures reported by the store are part
//! of the payload (`{"status": "error", "error": ...}`); only malformed calls
//! become a [`ToolError`].

use serde_json::{json, Value};

use crate::confirmation::{ConfirmationGate, TargetKind};
use crate::content::{self, ContentKind};
use crate::oauth;
use crate::session::Session;
use crate::state::AppState;
use crate::store::{NewItem, StoreError, Upload, ROOT_ID};

#[cfg(test)]
mod tests;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Google Drive is not authenticated, provide an access token at {0}/api/auth/token")]
    Unauthenticated(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Format accepted by `create_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Text,
    Json,
    Csv,
}

/// A parsed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Delete {
        kind: TargetKind,
        target_id: String,
        confirmation_token: Option<String>,
    },
    CreateFolder {
        name: String,
        parent_id: Option<String>,
    },
    MoveItem {
        item_id: String,
        new_parent_id: String,
    },
    SearchByName {
        name: String,
    },
    ItemDetails {
        item_id: String,
    },
    ListFolder {
        folder_id: Option<String>,
    },
    FileContents {
        file_id: String,
    },
    CreateDocument {
        title: String,
        content: String,
        parent_id: Option<String>,
    },
    CreateSpreadsheet {
        title: String,
        rows: Vec<Vec<String>>,
        parent_id: Option<String>,
    },
    CreateFile {
        name: String,
        content: String,
        file_type: String,
        parent_id: Option<String>,
    },
    EditDocument {
        document_id: String,
        new_content: String,
    },
    AddRows {
        sheet_id: String,
        values: Vec<Vec<String>>,
    },
    EditRows {
        sheet_id: String,
        range_name: String,
        values: Vec<Vec<String>>,
    },
    DeleteRows {
        sheet_id: String,
        row_indices: Vec<u32>,
    },
}

fn required(args: &Value, key: &'static str) -> Result<String, ToolError> {
    args[key]
        .as_str()
        .map(str::to_string)
        .ok_or(ToolError::MissingArgument(key))
}

/// Absent, null and empty strings all read as `None`.
fn optional(args: &Value, key: &str) -> Option<String> {
    args[key]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Spreadsheet rows: an array of arrays of scalars, each cell stringified.
/// Absent means no rows.
fn parse_rows(args: &Value, key: &'static str) -> Result<Vec<Vec<String>>, ToolError> {
    let invalid = |reason: &str| ToolError::InvalidArgument {
        name: key,
        reason: reason.to_string(),
    };
    let rows = match &args[key] {
        Value::Null => return Ok(Vec::new()),
        Value::Array(rows) => rows,
        _ => return Err(invalid("expected an array of rows")),
    };
    rows.iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| invalid("each row must be an array"))?
                .iter()
                .map(|cell| match cell {
                    Value::String(s) => Ok(s.clone()),
                    Value::Null => Ok(String::new()),
                    Value::Number(_) | Value::Bool(_) => Ok(cell.to_string()),
                    _ => Err(invalid("cells must be strings, numbers or booleans")),
                })
                .collect()
        })
        .collect()
}

fn required_rows(args: &Value, key: &'static str) -> Result<Vec<Vec<String>>, ToolError> {
    if args[key].is_null() {
        return Err(ToolError::MissingArgument(key));
    }
    parse_rows(args, key)
}

/// 1-based row numbers.
fn parse_row_indices(args: &Value) -> Result<Vec<u32>, ToolError> {
    let invalid = |reason: &str| ToolError::InvalidArgument {
        name: "row_indices",
        reason: reason.to_string(),
    };
    match &args["row_indices"] {
        Value::Null => Err(ToolError::MissingArgument("row_indices")),
        Value::Array(indices) if !indices.is_empty() => indices
            .iter()
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| invalid("row numbers start at 1"))
            })
            .collect(),
        _ => Err(invalid("expected a non-empty array of row numbers")),
    }
}

impl ToolCall {
    pub fn parse(name: &str, args: &Value) -> Result<Self, ToolError> {
        let delete = |kind: TargetKind, key: &str| ToolCall::Delete {
            kind,
            // A missing id reaches the gate as empty and is rejected there.
            target_id: args[key].as_str().unwrap_or_default().to_string(),
            confirmation_token: optional(args, "confirmation_token"),
        };

        Ok(match name {
            "delete_item" => delete(TargetKind::Item, "item_id"),
            "delete_file" => delete(TargetKind::File, "file_id"),
            "delete_folder" => delete(TargetKind::Folder, "folder_id"),
            "create_folder" => ToolCall::CreateFolder {
                name: required(args, "folder_name")?,
                parent_id: optional(args, "parent_id"),
            },
            "move_item" => ToolCall::MoveItem {
                item_id: required(args, "item_id")?,
                new_parent_id: required(args, "new_parent_id")?,
            },
            "search_items_by_name" => ToolCall::SearchByName {
                name: required(args, "name")?,
            },
            "get_item_details" => ToolCall::ItemDetails {
                item_id: required(args, "item_id")?,
            },
            "list_folder_contents" => ToolCall::ListFolder {
                folder_id: optional(args, "folder_id"),
            },
            "get_file_contents" => ToolCall::FileContents {
                file_id: required(args, "file_id")?,
            },
            "create_document" => ToolCall::CreateDocument {
                title: required(args, "title")?,
                content: required(args, "content")?,
                parent_id: optional(args, "parent_folder_id"),
            },
            "create_spreadsheet" => ToolCall::CreateSpreadsheet {
                title: required(args, "title")?,
                rows: parse_rows(args, "rows")?,
                parent_id: optional(args, "parent_folder_id"),
            },
            "create_file" => ToolCall::CreateFile {
                name: required(args, "name")?,
                content: required(args, "content")?,
                file_type: required(args, "file_type")?,
                parent_id: optional(args, "parent_id"),
            },
            "edit_document" => ToolCall::EditDocument {
                document_id: required(args, "document_id")?,
                new_content: required(args, "new_content")?,
            },
            "add_rows_to_sheet" => ToolCall::AddRows {
                sheet_id: required(args, "sheet_id")?,
                values: required_rows(args, "values")?,
            },
            "edit_rows_of_sheet" => ToolCall::EditRows {
                sheet_id: required(args, "sheet_id")?,
                range_name: required(args, "range_name")?,
                values: required_rows(args, "values")?,
            },
            "delete_rows_from_sheet" => ToolCall::DeleteRows {
                sheet_id: required(args, "sheet_id")?,
                row_indices: parse_row_indices(args)?,
            },
            other => return Err(ToolError::UnknownTool(other.to_string())),
        })
    }
}

/// Central dispatcher: parse the call, resolve the caller's session, run.
pub async fn execute_tool(name: &str, args: &Value, state: &AppState) -> Result<Value, ToolError> {
    let call = ToolCall::parse(name, args)?;

    let session = match oauth::resolve_session(state).await {
        Ok(session) => session,
        Err(e @ (ToolError::Unauthenticated(_) | ToolError::Store(_))) => {
            tracing::warn!(tool = %name, "no usable session: {}", e);
            return Ok(error_payload(e));
        }
        Err(e) => return Err(e),
    };

    tracing::debug!(tool = %name, principal = %session.principal(), "executing tool");
    Ok(run_tool(call, &session, &state.gate).await)
}

/// Run an already parsed call against `session`'s store.
pub async fn run_tool(call: ToolCall, session: &Session, gate: &ConfirmationGate) -> Value {
    let store = session.store();
    match call {
        ToolCall::Delete {
            kind,
            target_id,
            confirmation_token,
        } => gate
            .request_deletion(store, kind, &target_id, confirmation_token.as_deref())
            .await
            .to_json(),
        ToolCall::CreateFolder { name, parent_id } => tool_create_folder(session, &name, parent_id.as_deref())
            .await
            .unwrap_or_else(error_payload),
        ToolCall::MoveItem {
            item_id,
            new_parent_id,
        } => tool_move_item(session, &item_id, &new_parent_id)
            .await
            .unwrap_or_else(error_payload),
        ToolCall::SearchByName { name } => tool_search_items_by_name(session, &name)
            .await
            .unwrap_or_else(error_payload),
        ToolCall::ItemDetails { item_id } => tool_get_item_details(session, &item_id)
            .await
            .unwrap_or_else(error_payload),
        ToolCall::ListFolder { folder_id } => tool_list_folder_contents(session, folder_id.as_deref())
            .await
            .unwrap_or_else(|e| error_message(format!("Failed to retrieve items: {}", e))),
        ToolCall::FileContents { file_id } => tool_get_file_contents(session, &file_id).await,
        ToolCall::CreateDocument {
            title,
            content,
            parent_id,
        } => tool_create_document(session, &title, &content, parent_id.as_deref())
            .await
            .unwrap_or_else(|e| error_message(format!("Failed to create document: {}", e))),
        ToolCall::CreateSpreadsheet {
            title,
            rows,
            parent_id,
        } => tool_create_spreadsheet(session, &title, &rows, parent_id.as_deref())
            .await
            .unwrap_or_else(|e| error_message(format!("Failed to create spreadsheet: {}", e))),
        ToolCall::CreateFile {
            name,
            content,
            file_type,
            parent_id,
        } => tool_create_file(session, &name, &content, &file_type, parent_id.as_deref()).await,
        ToolCall::EditDocument {
            document_id,
            new_content,
        } => tool_edit_document(session, &document_id, &new_content)
            .await
            .unwrap_or_else(|e| error_message(format!("Failed to edit document: {}", e))),
        ToolCall::AddRows { sheet_id, values } => tool_add_rows_to_sheet(session, &sheet_id, &values)
            .await
            .unwrap_or_else(error_payload),
        ToolCall::EditRows {
            sheet_id,
            range_name,
            values,
        } => tool_edit_rows_of_sheet(session, &sheet_id, &range_name, &values)
            .await
            .unwrap_or_else(error_payload),
        ToolCall::DeleteRows {
            sheet_id,
            row_indices,
        } => tool_delete_rows_from_sheet(session, &sheet_id, &row_indices)
            .await
            .unwrap_or_else(error_payload),
    }
}

fn error_message(message: String) -> Value {
    json!({ "status": "error", "error": message })
}

fn error_payload(e: impl std::fmt::Display) -> Value {
    error_message(e.to_string())
}

// ---------------------------------------------------------------------------
// Folders & items
// ---------------------------------------------------------------------------

async fn tool_create_folder(session: &Session, name: &str, parent_id: Option<&str>) -> Result<Value, StoreError> {
    let folder = session.store().create(NewItem::folder(name, parent_id)).await?;
    tracing::info!(folder_id = %folder.id, name = %name, "folder created");
    Ok(json!({
        "status": "success",
        "data": { "name": folder.name, "id": folder.id },
    }))
}

async fn tool_move_item(session: &Session, item_id: &str, new_parent_id: &str) -> Result<Value, StoreError> {
    session.store().move_item(item_id, new_parent_id).await?;
    tracing::info!(item_id = %item_id, new_parent_id = %new_parent_id, "item moved");
    Ok(json!({
        "status": "success",
        "message": format!("Item ID: {} moved to folder ID: {}.", item_id, new_parent_id),
    }))
}

async fn tool_search_items_by_name(session: &Session, name: &str) -> Result<Value, StoreError> {
    let files = session.store().search_by_name(name).await?;
    tracing::debug!(name = %name, hits = files.len(), "search by name");
    Ok(json!({ "status": "success", "files": files }))
}

async fn tool_get_item_details(session: &Session, item_id: &str) -> Result<Value, StoreError> {
    let store = session.store();
    let item = store.get(item_id).await?;
    let is_folder = item.is_folder();
    let file_count = if is_folder {
        store.list_children(item_id).await?.len()
    } else {
        0
    };
    Ok(json!({
        "status": "success",
        "file_info": item,
        "is_folder": is_folder,
        "file_count": file_count,
    }))
}

async fn tool_list_folder_contents(session: &Session, folder_id: Option<&str>) -> Result<Value, StoreError> {
    let folder_id = folder_id.unwrap_or(ROOT_ID);
    let items = session.store().list_children(folder_id).await?;
    tracing::debug!(folder_id = %folder_id, count = items.len(), "listed folder");

    let data: Vec<Value> = items
        .iter()
        .map(|item| {
            json!({
                "name": item.name,
                "id": item.id,
                "extension": content::extension_for_mime(&item.mime_type),
                "type": if item.is_folder() { "folder" } else { "file" },
            })
        })
        .collect();
    Ok(json!({ "status": "success", "data": data }))
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

async fn tool_get_file_contents(session: &Session, file_id: &str) -> Value {
    let store = session.store();
    let item = match store.get(file_id).await {
        Ok(item) => item,
        Err(e) => return error_payload(e),
    };
    match content::read_content(store, &item).await {
        Ok(content) => json!({ "status": "success", "content": content.to_json() }),
        Err(e) => {
            tracing::warn!(file_id = %file_id, mime_type = %item.mime_type, "cannot read content: {}", e);
            error_payload(e)
        }
    }
}

async fn create_with_content(
    session: &Session,
    name: &str,
    kind: ContentKind,
    bytes: Option<Vec<u8>>,
    parent_id: Option<&str>,
) -> Result<String, StoreError> {
    let item = session
        .store()
        .create(NewItem {
            name: name.to_string(),
            mime_type: kind.item_mime().to_string(),
            parent: parent_id.map(str::to_string),
            upload: bytes.map(|bytes| Upload {
                mime_type: kind.upload_mime().to_string(),
                bytes,
            }),
        })
        .await?;
    tracing::info!(item_id = %item.id, name = %name, ?kind, "created");
    Ok(item.id)
}

async fn tool_create_document(
    session: &Session,
    title: &str,
    content: &str,
    parent_id: Option<&str>,
) -> Result<Value, StoreError> {
    let id = create_with_content(
        session,
        title,
        ContentKind::Document,
        Some(content.as_bytes().to_vec()),
        parent_id,
    )
    .await?;
    Ok(json!({
        "status": "success",
        "message": "Document created successfully.",
        "document_id": id,
    }))
}

async fn tool_create_spreadsheet(
    session: &Session,
    title: &str,
    rows: &[Vec<String>],
    parent_id: Option<&str>,
) -> Result<Value, String> {
    let bytes = if rows.is_empty() {
        None
    } else {
        Some(content::write_csv(rows).map_err(|e| e.to_string())?)
    };
    let id = create_with_content(session, title, ContentKind::Spreadsheet, bytes, parent_id)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({
        "status": "success",
        "message": "Spreadsheet created successfully.",
        "spreadsheet_id": id,
    }))
}

impl FileType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "text" => Some(FileType::Text),
            "json" => Some(FileType::Json),
            "csv" => Some(FileType::Csv),
            _ => None,
        }
    }

    fn content_kind(self) -> ContentKind {
        match self {
            FileType::Text => ContentKind::PlainText,
            FileType::Json => ContentKind::Json,
            FileType::Csv => ContentKind::Csv,
        }
    }

    /// Validate and normalise `content` for upload.
    fn prepare(self, content: &str) -> Result<Vec<u8>, String> {
        match self {
            FileType::Text => Ok(content.as_bytes().to_vec()),
            FileType::Json => {
                let value: Value =
                    serde_json::from_str(content).map_err(|_| "Invalid JSON content.".to_string())?;
                serde_json::to_vec_pretty(&value).map_err(|e| format!("Invalid JSON content: {}", e))
            }
            FileType::Csv => {
                let rows = content::parse_csv(content.as_bytes()).map_err(|e| e.to_string())?;
                content::write_csv(&rows).map_err(|e| e.to_string())
            }
        }
    }
}

async fn tool_create_file(
    session: &Session,
    name: &str,
    content: &str,
    file_type: &str,
    parent_id: Option<&str>,
) -> Value {
    let Some(file_type) = FileType::parse(file_type) else {
        return error_message("Unsupported file type. Please use 'text', 'json', or 'csv'.".to_string());
    };
    let bytes = match file_type.prepare(content) {
        Ok(bytes) => bytes,
        Err(message) => return error_message(message),
    };

    match create_with_content(session, name, file_type.content_kind(), Some(bytes), parent_id).await {
        Ok(id) => json!({
            "status": "success",
            "message": "File created and uploaded successfully.",
            "file_id": id,
        }),
        Err(e) => error_message(format!("Failed to create file: {}", e)),
    }
}

// ---------------------------------------------------------------------------
// Docs & Sheets edits
// ---------------------------------------------------------------------------

async fn tool_edit_document(session: &Session, document_id: &str, new_content: &str) -> Result<Value, StoreError> {
    session.store().prepend_document_text(document_id, new_content).await?;
    tracing::info!(document_id = %document_id, chars = new_content.len(), "document edited");
    Ok(json!({ "status": "success", "message": "Document edited successfully." }))
}

async fn tool_add_rows_to_sheet(
    session: &Session,
    sheet_id: &str,
    values: &[Vec<String>],
) -> Result<Value, StoreError> {
    session.store().append_rows(sheet_id, values).await?;
    tracing::info!(sheet_id = %sheet_id, rows = values.len(), "rows appended");
    Ok(json!({ "status": "success", "message": "Content added successfully." }))
}

async fn tool_edit_rows_of_sheet(
    session: &Session,
    sheet_id: &str,
    range_name: &str,
    values: &[Vec<String>],
) -> Result<Value, StoreError> {
    session.store().update_range(sheet_id, range_name, values).await?;
    tracing::info!(sheet_id = %sheet_id, range = %range_name, "range updated");
    Ok(json!({ "status": "success", "message": "Content edited successfully." }))
}

async fn tool_delete_rows_from_sheet(
    session: &Session,
    sheet_id: &str,
    row_indices: &[u32],
) -> Result<Value, StoreError> {
    session.store().delete_rows(sheet_id, row_indices).await?;
    tracing::info!(sheet_id = %sheet_id, rows = ?row_indices, "rows deleted");
    Ok(json!({
        "status": "success",
        "message": format!("Rows {:?} deleted successfully.", row_indices),
    }))
}
