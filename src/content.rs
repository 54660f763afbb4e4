//! File content extraction, one handler per content kind.
//!
//! Google-native items (Docs, Sheets) are exported into a flat format; blob
//! items are downloaded and decoded locally. Mime types outside
//! [`ContentKind`] are unsupported.

use serde_json::{json, Value};

use crate::store::{Item, RemoteObjectStore, StoreError, DOCUMENT_MIME, FOLDER_MIME, SPREADSHEET_MIME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Document,
    Spreadsheet,
    PlainText,
    Json,
    Csv,
    Pdf,
}

impl ContentKind {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type {
            DOCUMENT_MIME => Some(ContentKind::Document),
            SPREADSHEET_MIME => Some(ContentKind::Spreadsheet),
            "text/plain" => Some(ContentKind::PlainText),
            "application/json" => Some(ContentKind::Json),
            "text/csv" => Some(ContentKind::Csv),
            "application/pdf" => Some(ContentKind::Pdf),
            _ => None,
        }
    }

    /// Mime type of the bytes uploaded when creating an item of this kind.
    /// Docs and Sheets are created by converting text / CSV uploads.
    pub fn upload_mime(self) -> &'static str {
        match self {
            ContentKind::Document | ContentKind::PlainText => "text/plain",
            ContentKind::Spreadsheet | ContentKind::Csv => "text/csv",
            ContentKind::Json => "application/json",
            ContentKind::Pdf => "application/pdf",
        }
    }

    /// Mime type of the item itself.
    pub fn item_mime(self) -> &'static str {
        match self {
            ContentKind::Document => DOCUMENT_MIME,
            ContentKind::Spreadsheet => SPREADSHEET_MIME,
            other => other.upload_mime(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Unsupported file type.")]
    Unsupported,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("File is not valid UTF-8 text: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid JSON content: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid CSV content: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to extract PDF text: {0}")]
    Pdf(String),
}

/// Decoded content of a file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    Text(String),
    Rows(Vec<Vec<String>>),
    Sheet {
        title: String,
        values: Vec<Vec<String>>,
    },
    Json(Value),
}

impl FileContent {
    pub fn to_json(&self) -> Value {
        match self {
            FileContent::Text(t) => json!(t),
            FileContent::Rows(rows) => json!(rows),
            FileContent::Sheet { title, values } => json!({ "title": title, "values": values }),
            FileContent::Json(v) => v.clone(),
        }
    }
}

/// Fetch and decode `item`'s content according to its mime type.
pub async fn read_content(store: &dyn RemoteObjectStore, item: &Item) -> Result<FileContent, ContentError> {
    let kind = ContentKind::from_mime(&item.mime_type).ok_or(ContentError::Unsupported)?;
    tracing::debug!(file_id = %item.id, ?kind, "reading file content");

    match kind {
        ContentKind::Document => {
            let bytes = store.export(&item.id, "text/plain").await?;
            Ok(FileContent::Text(decode_text(bytes)?))
        }
        ContentKind::Spreadsheet => {
            // CSV export covers the first sheet only.
            let bytes = store.export(&item.id, "text/csv").await?;
            Ok(FileContent::Sheet {
                title: item.name.clone(),
                values: parse_csv(&bytes)?,
            })
        }
        ContentKind::PlainText => {
            let bytes = store.download(&item.id).await?;
            Ok(FileContent::Text(decode_text(bytes)?))
        }
        ContentKind::Json => {
            let bytes = store.download(&item.id).await?;
            Ok(FileContent::Json(serde_json::from_slice(&bytes)?))
        }
        ContentKind::Csv => {
            let bytes = store.download(&item.id).await?;
            Ok(FileContent::Rows(parse_csv(&bytes)?))
        }
        ContentKind::Pdf => {
            let bytes = store.download(&item.id).await?;
            Ok(FileContent::Text(extract_pdf_text(bytes).await?))
        }
    }
}

/// UTF-8 decode, stripping a leading BOM (Docs exports carry one). Content
/// that is only whitespace comes back as an empty string.
fn decode_text(bytes: Vec<u8>) -> Result<String, ContentError> {
    let text = String::from_utf8(bytes)?;
    let text = text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text);
    if text.trim().is_empty() {
        return Ok(String::new());
    }
    Ok(text)
}

pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, ContentError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Rows back into CSV text, for uploads.
pub fn write_csv(rows: &[Vec<String>]) -> Result<Vec<u8>, ContentError> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ContentError::Csv(e.into_error().into()))
}

async fn extract_pdf_text(bytes: Vec<u8>) -> Result<String, ContentError> {
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| ContentError::Pdf(e.to_string()))?
        .map_err(|e| ContentError::Pdf(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(String::new());
    }
    Ok(text)
}

/// Short extension label for listings.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/msword" => "doc",
        DOCUMENT_MIME => "gdoc",
        SPREADSHEET_MIME => "gsheet",
        "application/vnd.google-apps.presentation" => "gslides",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        FOLDER_MIME => "folder",
        _ => "unknown",
    }
}
