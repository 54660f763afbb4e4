// Google Drive v3 REST backend.
//
// Only the calls the tools need: Drive files.get / list / create / update /
// delete, media download and export, plus the Docs batchUpdate and Sheets
// values calls behind the edit tools. Authentication is a bearer access token
// handed over by the session; refreshing it is someone else's job.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::{Item, NewItem, RemoteObjectStore, StoreError, StoreResult};

pub const DEFAULT_DOCS_API_BASE: &str = "https://docs.googleapis.com";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

const ITEM_FIELDS: &str = "id,name,mimeType,size,parents";
const LIST_FIELDS: &str = "files(id,name,mimeType,size,parents)";
const PAGE_SIZE: &str = "100";
const MULTIPART_BOUNDARY: &str = "drive_mcp_upload_boundary";

#[derive(Clone)]
pub struct DriveStore {
    client: Client,
    api_base: Url,
    docs_base: Url,
    sheets_base: Url,
    access_token: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<Item>,
}

impl DriveStore {
    /// `api_base` is the Google APIs origin, e.g. `https://www.googleapis.com`.
    pub fn new(client: Client, api_base: &str, access_token: String) -> StoreResult<Self> {
        Ok(Self {
            client,
            api_base: parse_base("Drive", api_base)?,
            docs_base: parse_base("Docs", DEFAULT_DOCS_API_BASE)?,
            sheets_base: parse_base("Sheets", DEFAULT_SHEETS_API_BASE)?,
            access_token,
        })
    }

    /// Point the Docs and Sheets calls at other origins.
    pub fn with_editor_bases(mut self, docs_base: &str, sheets_base: &str) -> StoreResult<Self> {
        self.docs_base = parse_base("Docs", docs_base)?;
        self.sheets_base = parse_base("Sheets", sheets_base)?;
        Ok(self)
    }

    /// Build `{base}/{prefix...}/files[/{id}][/{suffix}]` with each segment
    /// percent-encoded.
    fn files_url(&self, prefix: &[&str], id: Option<&str>, suffix: Option<&str>) -> StoreResult<Url> {
        let mut segments: Vec<&str> = prefix.to_vec();
        segments.extend(["drive", "v3", "files"]);
        segments.extend(id);
        segments.extend(suffix);
        join_segments(&self.api_base, &segments)
    }

    /// `{sheets}/v4/spreadsheets/{id}` followed by `rest`.
    fn sheets_url(&self, id: &str, rest: &[&str]) -> StoreResult<Url> {
        let mut segments = vec!["v4", "spreadsheets", id];
        segments.extend(rest);
        join_segments(&self.sheets_base, &segments)
    }

    async fn send_ok(&self, builder: RequestBuilder) -> StoreResult<()> {
        check_status(self.authed(builder).send().await?).await?;
        Ok(())
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.access_token)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> StoreResult<T> {
        let resp = check_status(self.authed(builder).send().await?).await?;
        resp.json::<T>().await.map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn fetch_bytes(&self, builder: RequestBuilder) -> StoreResult<Vec<u8>> {
        let resp = check_status(self.authed(builder).send().await?).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn list_query(&self, q: &str) -> StoreResult<Vec<Item>> {
        let mut url = self.files_url(&[], None, None)?;
        url.query_pairs_mut()
            .append_pair("q", q)
            .append_pair("fields", LIST_FIELDS)
            .append_pair("pageSize", PAGE_SIZE);
        let list: FileList = self.fetch_json(self.client.get(url)).await?;
        Ok(list.files)
    }
}

#[async_trait]
impl RemoteObjectStore for DriveStore {
    async fn delete(&self, id: &str) -> StoreResult<()> {
        let url = self.files_url(&[], Some(id), None)?;
        self.send_ok(self.client.delete(url)).await
    }

    async fn get(&self, id: &str) -> StoreResult<Item> {
        let mut url = self.files_url(&[], Some(id), None)?;
        url.query_pairs_mut().append_pair("fields", ITEM_FIELDS);
        self.fetch_json(self.client.get(url)).await
    }

    async fn list_children(&self, folder_id: &str) -> StoreResult<Vec<Item>> {
        self.list_query(&format!("'{}' in parents and trashed = false", escape_query(folder_id)))
            .await
    }

    async fn search_by_name(&self, name: &str) -> StoreResult<Vec<Item>> {
        self.list_query(&format!("name = '{}' and trashed = false", escape_query(name)))
            .await
    }

    async fn create(&self, item: NewItem) -> StoreResult<Item> {
        let mut metadata = json!({
            "name": item.name,
            "mimeType": item.mime_type,
        });
        if let Some(parent) = &item.parent {
            metadata["parents"] = json!([parent]);
        }

        let builder = match &item.upload {
            None => {
                let mut url = self.files_url(&[], None, None)?;
                url.query_pairs_mut().append_pair("fields", ITEM_FIELDS);
                self.client.post(url).json(&metadata)
            }
            Some(upload) => {
                let mut url = self.files_url(&["upload"], None, None)?;
                url.query_pairs_mut()
                    .append_pair("uploadType", "multipart")
                    .append_pair("fields", ITEM_FIELDS);
                let body = multipart_related(&metadata, &upload.mime_type, &upload.bytes);
                self.client
                    .post(url)
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
                    )
                    .body(body)
            }
        };
        self.fetch_json(builder).await
    }

    async fn move_item(&self, id: &str, new_parent: &str) -> StoreResult<Item> {
        let current = self.get(id).await?;
        let mut url = self.files_url(&[], Some(id), None)?;
        url.query_pairs_mut()
            .append_pair("addParents", new_parent)
            .append_pair("removeParents", &current.parents.join(","))
            .append_pair("fields", ITEM_FIELDS);
        self.fetch_json(self.client.patch(url).json(&json!({}))).await
    }

    async fn download(&self, id: &str) -> StoreResult<Vec<u8>> {
        let mut url = self.files_url(&[], Some(id), None)?;
        url.query_pairs_mut().append_pair("alt", "media");
        self.fetch_bytes(self.client.get(url)).await
    }

    async fn export(&self, id: &str, mime_type: &str) -> StoreResult<Vec<u8>> {
        let mut url = self.files_url(&[], Some(id), Some("export"))?;
        url.query_pairs_mut().append_pair("mimeType", mime_type);
        self.fetch_bytes(self.client.get(url)).await
    }

    async fn prepend_document_text(&self, id: &str, text: &str) -> StoreResult<()> {
        let batch_update = format!("{}:batchUpdate", id);
        let url = join_segments(&self.docs_base, &["v1", "documents", &batch_update])?;
        let body = json!({
            "requests": [{
                "insertText": { "location": { "index": 1 }, "text": text }
            }]
        });
        self.send_ok(self.client.post(url).json(&body)).await
    }

    async fn append_rows(&self, id: &str, rows: &[Vec<String>]) -> StoreResult<()> {
        // A bare A1 range targets the first sheet whatever its title.
        let mut url = self.sheets_url(id, &["values", "A1:append"])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        self.send_ok(self.client.post(url).json(&json!({ "values": rows })))
            .await
    }

    async fn update_range(&self, id: &str, range: &str, rows: &[Vec<String>]) -> StoreResult<()> {
        let mut url = self.sheets_url(id, &["values", range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        self.send_ok(self.client.put(url).json(&json!({ "values": rows })))
            .await
    }

    async fn delete_rows(&self, id: &str, rows: &[u32]) -> StoreResult<()> {
        let mut url = self.sheets_url(id, &[])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.sheetId");
        let spreadsheet: Value = self.fetch_json(self.client.get(url)).await?;
        let sheet_id = spreadsheet
            .pointer("/sheets/0/properties/sheetId")
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::Decode("spreadsheet has no sheets".into()))?;

        let batch_update = format!("{}:batchUpdate", id);
        let url = join_segments(&self.sheets_base, &["v4", "spreadsheets", &batch_update])?;
        let body = json!({ "requests": delete_row_requests(sheet_id, rows) });
        self.send_ok(self.client.post(url).json(&body)).await
    }
}

/// One `deleteDimension` per row, bottom-up so earlier deletions don't shift
/// the later ones.
fn delete_row_requests(sheet_id: i64, rows: &[u32]) -> Vec<Value> {
    let mut rows = rows.to_vec();
    rows.sort_unstable_by(|a, b| b.cmp(a));
    rows.dedup();
    rows.into_iter()
        .map(|row| {
            json!({
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": row.saturating_sub(1),
                        "endIndex": row,
                    }
                }
            })
        })
        .collect()
}

fn parse_base(api: &str, raw: &str) -> StoreResult<Url> {
    Url::parse(raw).map_err(|e| StoreError::Unsupported(format!("invalid {} API base '{}': {}", api, raw, e)))
}

fn join_segments(base: &Url, segments: &[&str]) -> StoreResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| StoreError::Unsupported(format!("API base '{}' cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Pass 2xx responses through; turn anything else into a `StoreError`.
async fn check_status(resp: Response) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(status = status.as_u16(), "could not read Drive error body: {}", e);
            String::new()
        }
    };
    tracing::debug!(status = status.as_u16(), body = %body, "Drive API rejected request");
    let message = api_error_message(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());
    // 404s stay `Api` too: Drive already words them as "File not found: <id>."
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Extract the most specific message from a Google API error body:
/// `error.errors[0].message`, then `error.message`.
pub(crate) fn api_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .pointer("/errors/0/message")
        .and_then(Value::as_str)
        .or_else(|| error.get("message").and_then(Value::as_str))
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Escape a literal for use inside single quotes in a Drive `q` expression.
pub(crate) fn escape_query(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related(metadata: &Value, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {ct}\r\n\r\n",
            b = MULTIPART_BOUNDARY,
            meta = metadata,
            ct = content_type,
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}
