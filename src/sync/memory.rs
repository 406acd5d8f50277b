use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

use crate::db::TodoItem;

use super::{PullCursor, RemoteStore, TodoItemDto};

// Process-local document store for tests and offline development. Documents
// are JSON maps so shallow-merge semantics match the real backend.
pub struct InMemoryRemoteStore {
    documents: Mutex<BTreeMap<(String, String), Map<String, Value>>>,
    push_batches: AtomicU64,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(BTreeMap::new()),
            push_batches: AtomicU64::new(0),
        }
    }

    pub fn push_batch_count(&self) -> u64 {
        self.push_batches.load(Ordering::Relaxed)
    }

    // Replaces the whole document, as another device's push would have
    // left it.
    pub fn seed_item(&self, owner_id: &str, id: &str, dto: &TodoItemDto) -> Result<()> {
        let fields = dto_fields(dto)?;
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("poisoned lock"))?;
        documents.insert((owner_id.to_string(), id.to_string()), fields);
        Ok(())
    }

    pub fn set_document_field(
        &self,
        owner_id: &str,
        id: &str,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("poisoned lock"))?;
        let doc = documents
            .get_mut(&(owner_id.to_string(), id.to_string()))
            .ok_or_else(|| anyhow!("no document {owner_id}/{id}"))?;
        doc.insert(key.to_string(), value);
        Ok(())
    }

    pub fn document(&self, owner_id: &str, id: &str) -> Result<Option<Value>> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("poisoned lock"))?;
        Ok(documents
            .get(&(owner_id.to_string(), id.to_string()))
            .cloned()
            .map(Value::Object))
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn dto_fields(dto: &TodoItemDto) -> Result<Map<String, Value>> {
    match serde_json::to_value(dto)? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("todo item dto did not serialize to an object")),
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn push_items(&self, owner_id: &str, items: &[TodoItem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        // Merge all writes under one lock hold, matching the backend's
        // all-or-nothing batch contract.
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("poisoned lock"))?;
        for item in items {
            let fields = dto_fields(&TodoItemDto::from_item(item))?;
            let doc = documents
                .entry((owner_id.to_string(), item.id.clone()))
                .or_default();
            for (key, value) in fields {
                doc.insert(key, value);
            }
        }
        self.push_batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn fetch_updated_items(
        &self,
        owner_id: &str,
        cursor: &PullCursor,
        limit: usize,
    ) -> Result<Vec<TodoItem>> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("poisoned lock"))?;

        let mut admitted: Vec<(i64, String, TodoItemDto)> = Vec::new();
        for ((owner, id), fields) in documents.iter() {
            if owner != owner_id {
                continue;
            }
            let dto: TodoItemDto = serde_json::from_value(Value::Object(fields.clone()))
                .map_err(|e| anyhow!("malformed document {owner}/{id}: {e}"))?;
            if cursor.admits(dto.last_modified_ms, id) {
                admitted.push((dto.last_modified_ms, id.clone(), dto));
            }
        }

        admitted.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        admitted.truncate(limit);

        Ok(admitted
            .into_iter()
            .map(|(_, id, dto)| dto.into_item(&id, owner_id))
            .collect())
    }
}
