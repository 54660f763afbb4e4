// In-memory RemoteObjectStore: dev mode backend and test double.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::content;

use super::{
    Item, NewItem, RemoteObjectStore, StoreError, StoreResult, DOCUMENT_MIME, FOLDER_MIME,
    ROOT_ID, SPREADSHEET_MIME,
};

struct Entry {
    item: Item,
    content: Vec<u8>,
}

/// Uses `std::sync::Mutex`: no lock is ever held across an `.await`.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    delete_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item as-is (id included). Used to seed fixtures.
    pub fn insert(&self, item: Item, content: impl Into<Vec<u8>>) {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(
            item.id.clone(),
            Entry {
                item,
                content: content.into(),
            },
        );
    }

    /// Number of `delete` calls received, successful or not.
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::Acquire)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn not_found(id: &str) -> StoreError {
    StoreError::NotFound(id.to_string())
}

fn ensure_folder(map: &HashMap<String, Entry>, id: &str) -> StoreResult<()> {
    if id == ROOT_ID {
        return Ok(());
    }
    match map.get(id) {
        Some(e) if e.item.is_folder() => Ok(()),
        Some(_) => Err(StoreError::Api {
            status: 400,
            message: format!("Item {} is not a folder.", id),
        }),
        None => Err(not_found(id)),
    }
}

fn spreadsheet_mut<'a>(map: &'a mut HashMap<String, Entry>, id: &str) -> StoreResult<&'a mut Entry> {
    match map.get_mut(id) {
        Some(e) if e.item.mime_type == SPREADSHEET_MIME => Ok(e),
        Some(_) => Err(StoreError::Api {
            status: 400,
            message: "This operation is not supported for this document".to_string(),
        }),
        None => Err(StoreError::Api {
            status: 404,
            message: "Requested entity was not found.".to_string(),
        }),
    }
}

impl Entry {
    fn set_content(&mut self, content: Vec<u8>) {
        self.item.size = Some(content.len().to_string());
        self.content = content;
    }

    /// Sheet content is kept as CSV.
    fn rows(&self) -> StoreResult<Vec<Vec<String>>> {
        content::parse_csv(&self.content).map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn set_rows(&mut self, rows: &[Vec<String>]) -> StoreResult<()> {
        let bytes = content::write_csv(rows).map_err(|e| StoreError::Decode(e.to_string()))?;
        self.set_content(bytes);
        Ok(())
    }
}

/// Zero-based (row, column) of the top-left cell of an A1 range such as
/// `Sheet1!B2:C4`, `C3` or `A:B`. The sheet name is ignored.
fn range_origin(range: &str) -> Option<(usize, usize)> {
    let cells = range.rsplit_once('!').map_or(range, |(_, cells)| cells);
    let start = cells.split(':').next()?.trim();
    let letters: String = start.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &start[letters.len()..];
    if letters.is_empty() && digits.is_empty() {
        return None;
    }

    let col = letters
        .chars()
        .try_fold(0usize, |acc, c| {
            acc.checked_mul(26)?
                .checked_add((c.to_ascii_uppercase() as u8 - b'A') as usize + 1)
        })?
        .saturating_sub(1);
    let row = if digits.is_empty() {
        0
    } else {
        digits.parse::<usize>().ok().filter(|r| *r >= 1)? - 1
    };
    Some((row, col))
}

fn unparseable_range(range: &str) -> StoreError {
    StoreError::Api {
        status: 400,
        message: format!("Unable to parse range: {}", range),
    }
}

/// Walk up from `folder` towards the root; `true` if `ancestor` is met on the way.
fn is_same_or_descendant(map: &HashMap<String, Entry>, folder: &str, ancestor: &str) -> bool {
    let mut frontier = vec![folder.to_string()];
    let mut seen = HashSet::new();
    while let Some(current) = frontier.pop() {
        if current == ancestor {
            return true;
        }
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(entry) = map.get(&current) {
            frontier.extend(entry.item.parents.iter().cloned());
        }
    }
    false
}

#[async_trait]
impl RemoteObjectStore for InMemoryStore {
    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.delete_calls.fetch_add(1, Ordering::AcqRel);
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if !map.contains_key(id) {
            return Err(not_found(id));
        }

        // Breadth-first sweep of descendants; `seen` guards against cycles.
        let mut doomed = vec![id.to_string()];
        let mut seen: HashSet<String> = doomed.iter().cloned().collect();
        let mut i = 0;
        while i < doomed.len() {
            let parent = doomed[i].clone();
            let children: Vec<String> = map
                .values()
                .filter(|e| e.item.parents.iter().any(|p| *p == parent))
                .map(|e| e.item.id.clone())
                .filter(|child| seen.insert(child.clone()))
                .collect();
            doomed.extend(children);
            i += 1;
        }
        for d in doomed {
            map.remove(&d);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Item> {
        let map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        map.get(id).map(|e| e.item.clone()).ok_or_else(|| not_found(id))
    }

    async fn list_children(&self, folder_id: &str) -> StoreResult<Vec<Item>> {
        let map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        ensure_folder(&map, folder_id)?;
        let mut items: Vec<Item> = map
            .values()
            .filter(|e| e.item.parents.iter().any(|p| p == folder_id))
            .map(|e| e.item.clone())
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn search_by_name(&self, name: &str) -> StoreResult<Vec<Item>> {
        let map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let mut items: Vec<Item> = map
            .values()
            .filter(|e| e.item.name == name)
            .map(|e| e.item.clone())
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn create(&self, new: NewItem) -> StoreResult<Item> {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let parent = new.parent.unwrap_or_else(|| ROOT_ID.to_string());
        ensure_folder(&map, &parent)?;

        let content = new.upload.map(|u| u.bytes).unwrap_or_default();
        let item = Item {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: new.name,
            size: (new.mime_type != FOLDER_MIME).then(|| content.len().to_string()),
            mime_type: new.mime_type,
            parents: vec![parent],
        };
        map.insert(
            item.id.clone(),
            Entry {
                item: item.clone(),
                content,
            },
        );
        Ok(item)
    }

    async fn move_item(&self, id: &str, new_parent: &str) -> StoreResult<Item> {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        ensure_folder(&map, new_parent)?;
        if !map.contains_key(id) {
            return Err(not_found(id));
        }
        if is_same_or_descendant(&map, new_parent, id) {
            return Err(StoreError::Api {
                status: 400,
                message: "Increasing the depth of the folder hierarchy would create a cycle.".to_string(),
            });
        }
        let entry = map.get_mut(id).ok_or_else(|| not_found(id))?;
        entry.item.parents = vec![new_parent.to_string()];
        Ok(entry.item.clone())
    }

    async fn download(&self, id: &str) -> StoreResult<Vec<u8>> {
        let map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let entry = map.get(id).ok_or_else(|| not_found(id))?;
        if entry.item.mime_type.starts_with("application/vnd.google-apps.") {
            return Err(StoreError::Api {
                status: 403,
                message: "Only files with binary content can be downloaded. Use Export with Docs Editors files.".to_string(),
            });
        }
        Ok(entry.content.clone())
    }

    async fn export(&self, id: &str, _mime_type: &str) -> StoreResult<Vec<u8>> {
        let map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let entry = map.get(id).ok_or_else(|| not_found(id))?;
        match entry.item.mime_type.as_str() {
            DOCUMENT_MIME | SPREADSHEET_MIME => Ok(entry.content.clone()),
            _ => Err(StoreError::Api {
                status: 403,
                message: "Export only supports Docs Editors files.".to_string(),
            }),
        }
    }

    async fn prepend_document_text(&self, id: &str, text: &str) -> StoreResult<()> {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let entry = map.get_mut(id).ok_or_else(|| StoreError::Api {
            status: 404,
            message: "Requested entity was not found.".to_string(),
        })?;
        if entry.item.mime_type != DOCUMENT_MIME {
            return Err(StoreError::Api {
                status: 400,
                message: "This operation is not supported for this document".to_string(),
            });
        }
        let mut content = text.as_bytes().to_vec();
        content.extend_from_slice(&entry.content);
        entry.set_content(content);
        Ok(())
    }

    async fn append_rows(&self, id: &str, rows: &[Vec<String>]) -> StoreResult<()> {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let entry = spreadsheet_mut(&mut map, id)?;
        let mut existing = entry.rows()?;
        existing.extend(rows.iter().cloned());
        entry.set_rows(&existing)
    }

    async fn update_range(&self, id: &str, range: &str, rows: &[Vec<String>]) -> StoreResult<()> {
        let (top, left) = range_origin(range).ok_or_else(|| unparseable_range(range))?;
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let entry = spreadsheet_mut(&mut map, id)?;
        let mut grid = entry.rows()?;
        for (r, row) in rows.iter().enumerate() {
            let r = top + r;
            if grid.len() <= r {
                grid.resize_with(r + 1, Vec::new);
            }
            for (c, cell) in row.iter().enumerate() {
                let c = left + c;
                if grid[r].len() <= c {
                    grid[r].resize(c + 1, String::new());
                }
                grid[r][c] = cell.clone();
            }
        }
        entry.set_rows(&grid)
    }

    async fn delete_rows(&self, id: &str, rows: &[u32]) -> StoreResult<()> {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let entry = spreadsheet_mut(&mut map, id)?;
        let mut grid = entry.rows()?;

        let mut doomed: Vec<usize> = rows.iter().map(|r| *r as usize).collect();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        doomed.dedup();
        if let Some(bad) = doomed.iter().find(|r| **r == 0 || **r > grid.len()) {
            return Err(StoreError::Api {
                status: 400,
                message: format!("Row {} is outside the sheet (it has {} rows).", bad, grid.len()),
            });
        }
        for row in doomed {
            grid.remove(row - 1);
        }
        entry.set_rows(&grid)
    }
}
