use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{self, TodoItem};

mod memory;
pub mod http;

pub use memory::InMemoryRemoteStore;

pub const PULL_PAGE_SIZE: usize = 200;

// Wire shape of one remote document. `importance` and `is_synced` are
// local-only and never appear here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItemDto {
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(rename = "dueDate")]
    pub due_at_ms: Option<i64>,
    #[serde(rename = "isCompleted", default)]
    pub is_completed: bool,
    #[serde(rename = "lastModified")]
    pub last_modified_ms: i64,
    #[serde(rename = "isDeleted", default)]
    pub is_deleted: bool,
}

impl TodoItemDto {
    pub fn from_item(item: &TodoItem) -> Self {
        Self {
            title: item.title.clone(),
            detail: item.detail.clone(),
            due_at_ms: item.due_at_ms,
            is_completed: item.is_completed,
            last_modified_ms: item.last_modified_ms,
            is_deleted: item.is_deleted,
        }
    }

    // The result counts as synced; fields the wire does not carry come back
    // unspecified.
    pub fn into_item(self, id: &str, owner_id: &str) -> TodoItem {
        TodoItem {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            title: self.title,
            detail: self.detail,
            due_at_ms: self.due_at_ms,
            importance: None,
            is_completed: self.is_completed,
            last_modified_ms: self.last_modified_ms,
            is_synced: true,
            is_deleted: self.is_deleted,
        }
    }
}

// The first page admits documents modified strictly after `since_ms`; later
// pages continue strictly after the `(lastModified, id)` pair of the previous
// page's last document, so equal timestamps cannot be skipped across a page
// boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullCursor {
    pub since_ms: i64,
    pub after: Option<(i64, String)>,
}

impl PullCursor {
    pub fn since(since_ms: i64) -> Self {
        Self {
            since_ms,
            after: None,
        }
    }

    pub fn admits(&self, last_modified_ms: i64, id: &str) -> bool {
        match &self.after {
            None => last_modified_ms > self.since_ms,
            Some((after_ms, after_id)) => {
                last_modified_ms > *after_ms
                    || (last_modified_ms == *after_ms && id > after_id.as_str())
            }
        }
    }

    pub fn advance(&mut self, last_modified_ms: i64, id: &str) {
        self.after = Some((last_modified_ms, id.to_string()));
    }
}

// One owner's document collection, addressed `owners/{owner_id}/items/{id}`.
pub trait RemoteStore: Send + Sync {
    fn generate_id(&self) -> String;

    // Atomic batch with shallow-merge writes: fields absent from the DTO
    // stay untouched remotely. Must be a no-op on empty input, with no
    // network round trip.
    fn push_items(&self, owner_id: &str, items: &[TodoItem]) -> Result<()>;

    // At most `limit` documents admitted by `cursor`, ordered by
    // `(lastModified, id)` ascending.
    fn fetch_updated_items(
        &self,
        owner_id: &str,
        cursor: &PullCursor,
        limit: usize,
    ) -> Result<Vec<TodoItem>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeDisposition {
    Applied,
    Deleted,
    DiscardedLocalNewer,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub pulled: u64,
    pub applied: u64,
    pub deleted: u64,
    pub discarded: u64,
    pub pushed: u64,
    pub purged: u64,
}

fn checkpoint_key(owner_id: &str) -> String {
    format!("sync.last_sync_ms:{owner_id}")
}

// Epoch when the owner has never synced on this installation, so the first
// cycle pulls everything.
pub fn last_sync_ms(conn: &Connection, owner_id: &str) -> Result<i64> {
    Ok(db::kv_get_i64(conn, &checkpoint_key(owner_id))?.unwrap_or(0))
}

fn set_last_sync_ms(conn: &Connection, owner_id: &str, value: i64) -> Result<()> {
    db::kv_set_i64(conn, &checkpoint_key(owner_id), value)
}

// A remote tombstone removes the local copy unconditionally: deletion
// outranks any concurrent edit, whatever the timestamps say. Otherwise the
// newer `last_modified_ms` wins wholesale; fields are never merged
// individually.
pub fn apply_remote_item(conn: &Connection, item: &TodoItem) -> Result<MergeDisposition> {
    if item.is_deleted {
        db::remove_item(conn, &item.id)?;
        return Ok(MergeDisposition::Deleted);
    }

    match db::get_item(conn, &item.id)? {
        Some(local) if local.last_modified_ms >= item.last_modified_ms => {
            Ok(MergeDisposition::DiscardedLocalNewer)
        }
        _ => {
            let mut accepted = item.clone();
            accepted.is_synced = true;
            db::insert_or_update(conn, &accepted)?;
            Ok(MergeDisposition::Applied)
        }
    }
}

// One pull-then-push reconciliation cycle. The checkpoint candidate is
// captured before any I/O, so a remote write landing while the cycle runs is
// still admitted by the next cycle's strictly-greater filter. Any failure
// leaves the checkpoint unmoved; every operation on both sides is an
// idempotent upsert or delete, so the next invocation replays the whole
// cycle safely.
pub fn sync(conn: &Connection, remote: &impl RemoteStore, owner_id: &str) -> Result<SyncOutcome> {
    let now = db::now_ms();
    let since = last_sync_ms(conn, owner_id)?;

    let mut outcome = SyncOutcome::default();

    let mut cursor = PullCursor::since(since);
    loop {
        let page = remote.fetch_updated_items(owner_id, &cursor, PULL_PAGE_SIZE)?;
        let page_len = page.len();
        for item in &page {
            outcome.pulled += 1;
            match apply_remote_item(conn, item)? {
                MergeDisposition::Applied => outcome.applied += 1,
                MergeDisposition::Deleted => outcome.deleted += 1,
                MergeDisposition::DiscardedLocalNewer => outcome.discarded += 1,
            }
            cursor.advance(item.last_modified_ms, &item.id);
        }
        if page_len < PULL_PAGE_SIZE {
            break;
        }
    }

    // Everything just accepted in the pull is already marked synced, so this
    // snapshot holds exactly the local changes the remote has not seen.
    let unsynced = db::list_unsynced(conn, owner_id)?;
    remote.push_items(owner_id, &unsynced)?;
    outcome.pushed = unsynced.len() as u64;
    for item in &unsynced {
        if item.is_deleted {
            db::remove_item(conn, &item.id)?;
            outcome.purged += 1;
        } else {
            db::mark_item_synced(conn, &item.id, item.last_modified_ms)?;
        }
    }

    set_last_sync_ms(conn, owner_id, now)?;
    Ok(outcome)
}
