// ---------------------------------------------------------------------------
// tools/tests.rs: dispatcher tests against the in-memory store
// ---------------------------------------------------------------------------

use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::confirmation::{ConfirmationToken, FixedClock};
use crate::store::{InMemoryStore, Item, RemoteObjectStore, DOCUMENT_MIME, FOLDER_MIME, SPREADSHEET_MIME};

const T0: i64 = 1_700_000_000;

struct Harness {
    store: Arc<InMemoryStore>,
    session: Session,
    gate: ConfirmationGate,
    clock: Arc<FixedClock>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::new(T0));
    Harness {
        session: Session::new(store.clone(), "test"),
        gate: ConfirmationGate::new(clock.clone()),
        store,
        clock,
    }
}

impl Harness {
    async fn call(&self, name: &str, args: Value) -> Value {
        let call = ToolCall::parse(name, &args).unwrap();
        run_tool(call, &self.session, &self.gate).await
    }

    fn seed(&self, id: &str, name: &str, mime: &str, parent: &str, content: &str) {
        self.store.insert(
            Item {
                id: id.into(),
                name: name.into(),
                mime_type: mime.into(),
                size: None,
                parents: vec![parent.into()],
            },
            content,
        );
    }
}

// ── parsing ─────────────────────────────────────────────────────────────────

#[test]
fn missing_arguments_are_named() {
    let err = ToolCall::parse("move_item", &json!({ "item_id": "a" })).unwrap_err();
    assert_eq!(err.to_string(), "Missing required argument: new_parent_id");

    let err = ToolCall::parse("create_file", &json!({ "name": "n", "content": "c" })).unwrap_err();
    assert_eq!(err.to_string(), "Missing required argument: file_type");
}

#[test]
fn unknown_tool() {
    let err = ToolCall::parse("format_drive", &json!({})).unwrap_err();
    assert!(matches!(err, ToolError::UnknownTool(ref n) if n == "format_drive"));
}

#[test]
fn empty_token_reads_as_absent() {
    let call = ToolCall::parse("delete_file", &json!({ "file_id": "F1", "confirmation_token": "" })).unwrap();
    assert_eq!(
        call,
        ToolCall::Delete {
            kind: TargetKind::File,
            target_id: "F1".into(),
            confirmation_token: None,
        }
    );
}

#[test]
fn spreadsheet_rows_are_stringified() {
    let call = ToolCall::parse(
        "create_spreadsheet",
        &json!({ "title": "t", "rows": [["a", 1, true, null]] }),
    )
    .unwrap();
    let ToolCall::CreateSpreadsheet { rows, .. } = call else {
        panic!("wrong variant");
    };
    assert_eq!(rows, vec![vec!["a", "1", "true", ""]]);

    assert!(ToolCall::parse("create_spreadsheet", &json!({ "title": "t", "rows": "a,b" })).is_err());
    assert!(ToolCall::parse("create_spreadsheet", &json!({ "title": "t", "rows": [[{}]] })).is_err());
}

// ── deletion through the dispatcher ─────────────────────────────────────────

#[tokio::test]
async fn delete_file_two_step() {
    let h = harness();
    h.seed("F1", "report.txt", "text/plain", "root", "x");

    let first = h.call("delete_file", json!({ "file_id": "F1" })).await;
    assert_eq!(first["action"], "confirm_deletion");
    assert!(first["message"].as_str().unwrap().contains("file with ID 'F1'"));
    assert_eq!(h.store.delete_calls(), 0);

    let token = first["confirmation_token"].as_str().unwrap().to_string();
    h.clock.advance(10);
    let second = h
        .call("delete_file", json!({ "file_id": "F1", "confirmation_token": token }))
        .await;
    assert_eq!(second, json!({ "status": "success", "message": "File deleted successfully." }));
    assert_eq!(h.store.delete_calls(), 1);
    assert!(!h.store.contains("F1"));
}

#[tokio::test]
async fn delete_item_without_id_never_reaches_the_store() {
    let h = harness();
    let out = h.call("delete_item", json!({})).await;
    assert_eq!(out["error"], "A target ID is required to delete an item.");
    assert_eq!(h.store.delete_calls(), 0);
}

#[tokio::test]
async fn token_for_a_file_cannot_delete_a_folder() {
    let h = harness();
    h.seed("F1", "a.txt", "text/plain", "root", "");
    h.seed("D1", "docs", FOLDER_MIME, "root", "");

    let token = ConfirmationToken::new("F1", T0).encode();
    let out = h
        .call("delete_folder", json!({ "folder_id": "D1", "confirmation_token": token }))
        .await;
    assert_eq!(out["details"]["token_params"]["target_id"], "F1");
    assert_eq!(out["details"]["request_params"]["target_id"], "D1");
    assert_eq!(h.store.delete_calls(), 0);
    assert!(h.store.contains("D1"));
}

#[tokio::test]
async fn delete_folder_takes_children() {
    let h = harness();
    h.seed("D1", "docs", FOLDER_MIME, "root", "");
    h.seed("F1", "a.txt", "text/plain", "D1", "");

    let token = ConfirmationToken::new("D1", T0).encode();
    let out = h
        .call("delete_folder", json!({ "folder_id": "D1", "confirmation_token": token }))
        .await;
    assert_eq!(out["message"], "Folder deleted successfully.");
    assert!(h.store.is_empty());
}

// ── folders & items ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_folder_and_list_root() {
    let h = harness();
    let out = h.call("create_folder", json!({ "folder_name": "Projects" })).await;
    assert_eq!(out["status"], "success");
    assert_eq!(out["data"]["name"], "Projects");
    let folder_id = out["data"]["id"].as_str().unwrap().to_string();

    h.seed("P1", "plan.pdf", "application/pdf", "root", "");
    let listing = h.call("list_folder_contents", json!({})).await;
    assert_eq!(
        listing["data"],
        json!([
            { "name": "Projects", "id": folder_id, "extension": "folder", "type": "folder" },
            { "name": "plan.pdf", "id": "P1", "extension": "pdf", "type": "file" },
        ])
    );
}

#[tokio::test]
async fn listing_a_missing_folder_reports_the_store_error() {
    let h = harness();
    let out = h.call("list_folder_contents", json!({ "folder_id": "nope" })).await;
    assert_eq!(out["status"], "error");
    assert_eq!(out["error"], "Failed to retrieve items: File not found: nope.");
}

#[tokio::test]
async fn move_item_reports_both_ids() {
    let h = harness();
    h.seed("D1", "docs", FOLDER_MIME, "root", "");
    h.seed("F1", "a.txt", "text/plain", "root", "");

    let out = h.call("move_item", json!({ "item_id": "F1", "new_parent_id": "D1" })).await;
    assert_eq!(out["message"], "Item ID: F1 moved to folder ID: D1.");
    assert_eq!(h.store.get("F1").await.unwrap().parents, vec!["D1".to_string()]);

    let out = h.call("move_item", json!({ "item_id": "F1", "new_parent_id": "F1" })).await;
    assert_eq!(out["status"], "error");
}

#[tokio::test]
async fn folder_cannot_move_into_itself_or_its_child() {
    let h = harness();
    h.seed("D1", "outer", FOLDER_MIME, "root", "");
    h.seed("D2", "inner", FOLDER_MIME, "D1", "");

    let into_self = h.call("move_item", json!({ "item_id": "D1", "new_parent_id": "D1" })).await;
    assert_eq!(into_self["status"], "error");
    let into_child = h.call("move_item", json!({ "item_id": "D1", "new_parent_id": "D2" })).await;
    assert_eq!(into_child["status"], "error");
    assert_eq!(h.store.get("D1").await.unwrap().parents, vec!["root".to_string()]);

    // The tree is still acyclic, so a confirmed delete finishes.
    let token = ConfirmationToken::new("D1", T0).encode();
    let out = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        h.call("delete_folder", json!({ "folder_id": "D1", "confirmation_token": token })),
    )
    .await
    .expect("delete should not hang");
    assert_eq!(out["message"], "Folder deleted successfully.");
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn item_details_count_folder_children() {
    let h = harness();
    h.seed("D1", "docs", FOLDER_MIME, "root", "");
    h.seed("F1", "a.txt", "text/plain", "D1", "");
    h.seed("F2", "b.txt", "text/plain", "D1", "");

    let folder = h.call("get_item_details", json!({ "item_id": "D1" })).await;
    assert_eq!(folder["is_folder"], true);
    assert_eq!(folder["file_count"], 2);
    assert_eq!(folder["file_info"]["mimeType"], FOLDER_MIME);

    let file = h.call("get_item_details", json!({ "item_id": "F1" })).await;
    assert_eq!(file["is_folder"], false);
    assert_eq!(file["file_count"], 0);
}

#[tokio::test]
async fn search_by_exact_name() {
    let h = harness();
    h.seed("A", "notes", "text/plain", "root", "");
    h.seed("B", "notes", DOCUMENT_MIME, "root", "");
    h.seed("C", "notes-old", "text/plain", "root", "");

    let out = h.call("search_items_by_name", json!({ "name": "notes" })).await;
    let ids: Vec<&str> = out["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["A", "B"]);

    let none = h.call("search_items_by_name", json!({ "name": "missing" })).await;
    assert_eq!(none, json!({ "status": "success", "files": [] }));
}

// ── content ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_document_then_read_it_back() {
    let h = harness();
    let out = h
        .call("create_document", json!({ "title": "Minutes", "content": "Agenda: ship it" }))
        .await;
    assert_eq!(out["message"], "Document created successfully.");
    let id = out["document_id"].as_str().unwrap();

    let read = h.call("get_file_contents", json!({ "file_id": id })).await;
    assert_eq!(read, json!({ "status": "success", "content": "Agenda: ship it" }));
}

#[tokio::test]
async fn create_spreadsheet_in_folder() {
    let h = harness();
    h.seed("D1", "finance", FOLDER_MIME, "root", "");
    let out = h
        .call(
            "create_spreadsheet",
            json!({ "title": "Budget", "rows": [["item", "cost"], ["tea", 3]], "parent_folder_id": "D1" }),
        )
        .await;
    let id = out["spreadsheet_id"].as_str().unwrap();
    let item = h.store.get(id).await.unwrap();
    assert_eq!(item.mime_type, SPREADSHEET_MIME);
    assert_eq!(item.parents, vec!["D1".to_string()]);

    let read = h.call("get_file_contents", json!({ "file_id": id })).await;
    assert_eq!(
        read["content"],
        json!({ "title": "Budget", "values": [["item", "cost"], ["tea", "3"]] })
    );
}

#[tokio::test]
async fn create_file_validates_by_type() {
    let h = harness();

    let bad_json = h
        .call("create_file", json!({ "name": "a.json", "content": "{oops", "file_type": "json" }))
        .await;
    assert_eq!(bad_json, json!({ "status": "error", "error": "Invalid JSON content." }));

    let bad_type = h
        .call("create_file", json!({ "name": "a.xml", "content": "<a/>", "file_type": "xml" }))
        .await;
    assert_eq!(bad_type["error"], "Unsupported file type. Please use 'text', 'json', or 'csv'.");
    assert!(h.store.is_empty());

    let ok = h
        .call("create_file", json!({ "name": "a.json", "content": "{\"k\": [1]}", "file_type": "json" }))
        .await;
    assert_eq!(ok["message"], "File created and uploaded successfully.");
    let read = h
        .call("get_file_contents", json!({ "file_id": ok["file_id"] }))
        .await;
    assert_eq!(read["content"], json!({ "k": [1] }));
}

#[tokio::test]
async fn csv_files_read_back_as_rows() {
    let h = harness();
    let ok = h
        .call("create_file", json!({ "name": "t.csv", "content": "a,b\n1,2", "file_type": "csv" }))
        .await;
    let read = h.call("get_file_contents", json!({ "file_id": ok["file_id"] })).await;
    assert_eq!(read["content"], json!([["a", "b"], ["1", "2"]]));
}

#[tokio::test]
async fn unsupported_content_and_missing_files() {
    let h = harness();
    h.seed("IMG", "cat.png", "image/png", "root", "");

    let img = h.call("get_file_contents", json!({ "file_id": "IMG" })).await;
    assert_eq!(img, json!({ "status": "error", "error": "Unsupported file type." }));

    let missing = h.call("get_file_contents", json!({ "file_id": "ghost" })).await;
    assert_eq!(missing["error"], "File not found: ghost.");
}

// ── Docs & Sheets edits ─────────────────────────────────────────────────────

#[test]
fn edit_arguments_are_validated() {
    let err = ToolCall::parse("add_rows_to_sheet", &json!({ "sheet_id": "S" })).unwrap_err();
    assert_eq!(err.to_string(), "Missing required argument: values");

    let err = ToolCall::parse("delete_rows_from_sheet", &json!({ "sheet_id": "S" })).unwrap_err();
    assert_eq!(err.to_string(), "Missing required argument: row_indices");

    for bad in [json!([]), json!([0]), json!([-1]), json!(["2"]), json!(2)] {
        let err = ToolCall::parse("delete_rows_from_sheet", &json!({ "sheet_id": "S", "row_indices": bad }))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument { name: "row_indices", .. }));
    }

    let call = ToolCall::parse(
        "edit_rows_of_sheet",
        &json!({ "sheet_id": "S", "range_name": "A1", "values": [[1, "b"]] }),
    )
    .unwrap();
    assert_eq!(
        call,
        ToolCall::EditRows {
            sheet_id: "S".into(),
            range_name: "A1".into(),
            values: vec![vec!["1".to_string(), "b".to_string()]],
        }
    );
}

#[tokio::test]
async fn edit_document_prepends_text() {
    let h = harness();
    h.seed("DOC", "notes", DOCUMENT_MIME, "root", "old body");

    let out = h
        .call("edit_document", json!({ "document_id": "DOC", "new_content": "New intro. " }))
        .await;
    assert_eq!(out, json!({ "status": "success", "message": "Document edited successfully." }));

    let read = h.call("get_file_contents", json!({ "file_id": "DOC" })).await;
    assert_eq!(read["content"], "New intro. old body");

    h.seed("TXT", "plain.txt", "text/plain", "root", "x");
    let out = h
        .call("edit_document", json!({ "document_id": "TXT", "new_content": "y" }))
        .await;
    assert_eq!(out["status"], "error");
    assert!(out["error"].as_str().unwrap().starts_with("Failed to edit document: "));
}

#[tokio::test]
async fn sheet_rows_can_be_added_edited_and_deleted() {
    let h = harness();
    h.seed("S", "Budget", SPREADSHEET_MIME, "root", "item,cost\ntea,3\n");

    let out = h
        .call("add_rows_to_sheet", json!({ "sheet_id": "S", "values": [["milk", 2], ["bread", 4]] }))
        .await;
    assert_eq!(out["message"], "Content added successfully.");

    let out = h
        .call(
            "edit_rows_of_sheet",
            json!({ "sheet_id": "S", "range_name": "Sheet1!B2:B3", "values": [["5"], ["1"]] }),
        )
        .await;
    assert_eq!(out["message"], "Content edited successfully.");

    let out = h
        .call("delete_rows_from_sheet", json!({ "sheet_id": "S", "row_indices": [4, 2] }))
        .await;
    assert_eq!(out, json!({ "status": "success", "message": "Rows [4, 2] deleted successfully." }));

    let read = h.call("get_file_contents", json!({ "file_id": "S" })).await;
    assert_eq!(
        read["content"]["values"],
        json!([["item", "cost"], ["milk", "1"]])
    );
}

#[tokio::test]
async fn sheet_edits_on_missing_or_wrong_items_report_errors() {
    let h = harness();
    h.seed("DOC", "notes", DOCUMENT_MIME, "root", "");

    let missing = h
        .call("add_rows_to_sheet", json!({ "sheet_id": "ghost", "values": [["a"]] }))
        .await;
    assert_eq!(missing, json!({ "status": "error", "error": "Requested entity was not found." }));

    let wrong_kind = h
        .call("delete_rows_from_sheet", json!({ "sheet_id": "DOC", "row_indices": [1] }))
        .await;
    assert_eq!(wrong_kind["status"], "error");
}
