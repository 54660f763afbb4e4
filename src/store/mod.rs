//! Remote Object Store: the file/folder service the tools operate on.
//!
//! Two backends implement [`RemoteObjectStore`]:
//! - [`drive::DriveStore`]: Google Drive v3 REST, authenticated per session
//!   with a bearer access token.
//! - [`memory::InMemoryStore`]: process-local store used in dev mode and tests.
//!
//! Callers never look a store up from global state; a [`crate::session::Session`]
//! carries the handle into each tool call.

pub mod drive;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use drive::{DriveStore, DEFAULT_DOCS_API_BASE, DEFAULT_SHEETS_API_BASE};
pub use memory::InMemoryStore;

/// Mime type Drive uses for folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
/// Mime type of a Google Docs document.
pub const DOCUMENT_MIME: &str = "application/vnd.google-apps.document";
/// Mime type of a Google Sheets spreadsheet.
pub const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
/// Alias of the caller's top-level folder.
pub const ROOT_ID: &str = "root";

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Structured rejection from the remote API, `message` is safe to show.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("File not found: {0}.")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl StoreError {
    /// `true` when the remote service itself produced the error (as opposed
    /// to a local or network fault).
    pub fn is_remote(&self) -> bool {
        matches!(self, StoreError::Api { .. } | StoreError::NotFound(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Decode(e.to_string())
        } else {
            StoreError::Transport(e.to_string())
        }
    }
}

/// A file or folder as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl Item {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

/// Body uploaded alongside a new item. `mime_type` describes the bytes, which
/// may differ from the item's own mime type (Drive converts CSV uploads into
/// Sheets, plain text into Docs).
#[derive(Debug, Clone)]
pub struct Upload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub mime_type: String,
    pub parent: Option<String>,
    pub upload: Option<Upload>,
}

impl NewItem {
    pub fn folder(name: &str, parent: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            mime_type: FOLDER_MIME.to_string(),
            parent: parent.map(str::to_string),
            upload: None,
        }
    }
}

#[async_trait]
pub trait RemoteObjectStore: Send + Sync {
    /// Permanently delete an item. Folders take their descendants with them.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    async fn get(&self, id: &str) -> StoreResult<Item>;

    /// Direct children of `folder_id` (use [`ROOT_ID`] for the top level).
    async fn list_children(&self, folder_id: &str) -> StoreResult<Vec<Item>>;

    /// Items whose name equals `name` exactly.
    async fn search_by_name(&self, name: &str) -> StoreResult<Vec<Item>>;

    async fn create(&self, item: NewItem) -> StoreResult<Item>;

    /// Detach `id` from all current parents and attach it to `new_parent`.
    async fn move_item(&self, id: &str, new_parent: &str) -> StoreResult<Item>;

    /// Raw bytes of a binary/blob item.
    async fn download(&self, id: &str) -> StoreResult<Vec<u8>>;

    /// Render a Docs/Sheets item into `mime_type`.
    async fn export(&self, id: &str, mime_type: &str) -> StoreResult<Vec<u8>>;

    /// Insert `text` at the very start of a Docs document.
    async fn prepend_document_text(&self, id: &str, text: &str) -> StoreResult<()>;

    /// Append rows below the last non-empty row of the first sheet.
    async fn append_rows(&self, id: &str, rows: &[Vec<String>]) -> StoreResult<()>;

    /// Overwrite cells starting at the top-left cell of the A1 `range`.
    async fn update_range(&self, id: &str, range: &str, rows: &[Vec<String>]) -> StoreResult<()>;

    /// Remove rows (1-based) from the first sheet.
    async fn delete_rows(&self, id: &str, rows: &[u32]) -> StoreResult<()>;
}
