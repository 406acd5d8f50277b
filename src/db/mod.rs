use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};

const IMPORTANCE_MAX: i64 = 10;

// `importance` and `is_synced` are local-only; `is_deleted` rows are hidden
// from listing queries and live only until the delete has been pushed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TodoItem {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub detail: String,
    pub due_at_ms: Option<i64>,
    pub importance: Option<i64>,
    pub is_completed: bool,
    pub last_modified_ms: i64,
    pub is_synced: bool,
    pub is_deleted: bool,
}

// `None` keeps the stored value; the doubly-optional fields use `Some(None)`
// to clear.
#[derive(Clone, Debug, Default)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub detail: Option<String>,
    pub due_at_ms: Option<Option<i64>>,
    pub importance: Option<Option<i64>>,
    pub is_completed: Option<bool>,
    pub is_deleted: Option<bool>,
}

fn db_path(app_dir: &Path) -> PathBuf {
    app_dir.join("whatsnext.sqlite3")
}

pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

pub fn open(app_dir: &Path) -> Result<Connection> {
    fs::create_dir_all(app_dir)?;
    let conn = Connection::open(db_path(app_dir))?;
    conn.busy_timeout(Duration::from_millis(5_000))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    migrate(&conn)?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS todo_items (
  id TEXT PRIMARY KEY,
  owner_id TEXT NOT NULL,
  title TEXT NOT NULL,
  detail TEXT NOT NULL DEFAULT '',
  due_at_ms INTEGER,
  importance INTEGER,
  is_completed INTEGER NOT NULL DEFAULT 0,
  last_modified_ms INTEGER NOT NULL,
  is_synced INTEGER NOT NULL DEFAULT 0,
  is_deleted INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_todo_items_owner
  ON todo_items(owner_id);
CREATE INDEX IF NOT EXISTS idx_todo_items_owner_unsynced
  ON todo_items(owner_id, is_synced);

CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);
"#,
    )?;
    Ok(())
}

pub fn kv_get_string(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        r#"SELECT value FROM kv WHERE key = ?1"#,
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub fn kv_set_string(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"INSERT INTO kv(key, value) VALUES (?1, ?2)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value"#,
        params![key, value],
    )?;
    Ok(())
}

pub fn kv_get_i64(conn: &Connection, key: &str) -> Result<Option<i64>> {
    let Some(raw) = kv_get_string(conn, key)? else {
        return Ok(None);
    };
    let value = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| anyhow!("invalid i64 under kv key {key}: {raw}"))?;
    Ok(Some(value))
}

pub fn kv_set_i64(conn: &Connection, key: &str, value: i64) -> Result<()> {
    kv_set_string(conn, key, &value.to_string())
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(anyhow!("todo title must not be empty"));
    }
    Ok(())
}

fn validate_importance(importance: Option<i64>) -> Result<()> {
    if let Some(value) = importance {
        if !(0..=IMPORTANCE_MAX).contains(&value) {
            return Err(anyhow!("importance out of range 0..=10: {value}"));
        }
    }
    Ok(())
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<TodoItem> {
    Ok(TodoItem {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        detail: row.get(3)?,
        due_at_ms: row.get(4)?,
        importance: row.get(5)?,
        is_completed: row.get::<_, i64>(6)? != 0,
        last_modified_ms: row.get(7)?,
        is_synced: row.get::<_, i64>(8)? != 0,
        is_deleted: row.get::<_, i64>(9)? != 0,
    })
}

const ITEM_COLUMNS: &str = "id, owner_id, title, detail, due_at_ms, importance, is_completed, last_modified_ms, is_synced, is_deleted";

// Raw upsert by id, no timestamp refresh.
pub fn insert_or_update(conn: &Connection, item: &TodoItem) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO todo_items (
  id, owner_id, title, detail, due_at_ms, importance, is_completed, last_modified_ms, is_synced, is_deleted
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(id) DO UPDATE SET
  owner_id = excluded.owner_id,
  title = excluded.title,
  detail = excluded.detail,
  due_at_ms = excluded.due_at_ms,
  importance = excluded.importance,
  is_completed = excluded.is_completed,
  last_modified_ms = excluded.last_modified_ms,
  is_synced = excluded.is_synced,
  is_deleted = excluded.is_deleted
"#,
        params![
            item.id,
            item.owner_id,
            item.title,
            item.detail,
            item.due_at_ms,
            item.importance,
            item.is_completed as i64,
            item.last_modified_ms,
            item.is_synced as i64,
            item.is_deleted as i64,
        ],
    )?;
    Ok(())
}

// The id comes from the remote store's generator so the eventual push
// already has a collision-free document key.
pub fn insert_item(
    conn: &Connection,
    id: &str,
    owner_id: &str,
    title: &str,
    detail: &str,
    due_at_ms: Option<i64>,
    importance: Option<i64>,
) -> Result<TodoItem> {
    validate_title(title)?;
    validate_importance(importance)?;

    let item = TodoItem {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        title: title.to_string(),
        detail: detail.to_string(),
        due_at_ms,
        importance,
        is_completed: false,
        last_modified_ms: now_ms(),
        is_synced: false,
        is_deleted: false,
    };
    insert_or_update(conn, &item)?;
    Ok(item)
}

pub fn get_item(conn: &Connection, id: &str) -> Result<Option<TodoItem>> {
    conn.query_row(
        &format!(r#"SELECT {ITEM_COLUMNS} FROM todo_items WHERE id = ?1"#),
        params![id],
        row_to_item,
    )
    .optional()
    .map_err(Into::into)
}

// Refreshes `last_modified_ms` and clears `is_synced` on every call; a
// missing id is a no-op, not an error.
pub fn modify_item(conn: &Connection, id: &str, patch: &ItemPatch) -> Result<Option<TodoItem>> {
    let Some(existing) = get_item(conn, id)? else {
        return Ok(None);
    };

    let title = patch.title.clone().unwrap_or(existing.title);
    validate_title(&title)?;
    let importance = patch.importance.unwrap_or(existing.importance);
    validate_importance(importance)?;

    let updated = TodoItem {
        id: existing.id,
        owner_id: existing.owner_id,
        title,
        detail: patch.detail.clone().unwrap_or(existing.detail),
        due_at_ms: patch.due_at_ms.unwrap_or(existing.due_at_ms),
        importance,
        is_completed: patch.is_completed.unwrap_or(existing.is_completed),
        last_modified_ms: now_ms(),
        is_synced: false,
        is_deleted: patch.is_deleted.unwrap_or(existing.is_deleted),
    };
    insert_or_update(conn, &updated)?;
    Ok(Some(updated))
}

pub fn complete_item(conn: &Connection, id: &str) -> Result<Option<TodoItem>> {
    modify_item(
        conn,
        id,
        &ItemPatch {
            is_completed: Some(true),
            ..ItemPatch::default()
        },
    )
}

pub fn uncomplete_item(conn: &Connection, id: &str) -> Result<Option<TodoItem>> {
    modify_item(
        conn,
        id,
        &ItemPatch {
            is_completed: Some(false),
            ..ItemPatch::default()
        },
    )
}

// Tombstones the row. It stays in the table, hidden from listing queries,
// until the delete has been pushed; `remove_item` purges it.
pub fn delete_item(conn: &Connection, id: &str) -> Result<Option<TodoItem>> {
    modify_item(
        conn,
        id,
        &ItemPatch {
            is_deleted: Some(true),
            ..ItemPatch::default()
        },
    )
}

pub fn remove_item(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(r#"DELETE FROM todo_items WHERE id = ?1"#, params![id])?;
    Ok(())
}

pub fn list_items(conn: &Connection, owner_id: &str) -> Result<Vec<TodoItem>> {
    let mut stmt = conn.prepare(&format!(
        r#"
SELECT {ITEM_COLUMNS}
FROM todo_items
WHERE owner_id = ?1 AND is_deleted = 0
ORDER BY COALESCE(due_at_ms, 9223372036854775807) ASC, id ASC
"#
    ))?;

    let mut rows = stmt.query(params![owner_id])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(row_to_item(row)?);
    }
    Ok(result)
}

// Tombstones included so pending deletes get pushed too.
pub fn list_unsynced(conn: &Connection, owner_id: &str) -> Result<Vec<TodoItem>> {
    let mut stmt = conn.prepare(&format!(
        r#"
SELECT {ITEM_COLUMNS}
FROM todo_items
WHERE owner_id = ?1 AND is_synced = 0
ORDER BY last_modified_ms ASC, id ASC
"#
    ))?;

    let mut rows = stmt.query(params![owner_id])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(row_to_item(row)?);
    }
    Ok(result)
}

// Only marks the row if it still matches the pushed snapshot; an edit that
// landed after the push stays unsynced and goes out with the next cycle.
pub fn mark_item_synced(conn: &Connection, id: &str, pushed_last_modified_ms: i64) -> Result<bool> {
    let changed = conn.execute(
        r#"UPDATE todo_items
           SET is_synced = 1
           WHERE id = ?1 AND last_modified_ms = ?2"#,
        params![id, pushed_last_modified_ms],
    )?;
    Ok(changed > 0)
}

// The two onboarding items a fresh account starts with.
pub fn insert_starter_items(
    conn: &Connection,
    owner_id: &str,
    mut next_id: impl FnMut() -> String,
) -> Result<Vec<TodoItem>> {
    let first = insert_item(
        conn,
        &next_id(),
        owner_id,
        "Learn how to use What's Next",
        "This is a starter todo. Feel free to edit or delete it.",
        None,
        None,
    )?;
    let second = insert_item(
        conn,
        &next_id(),
        owner_id,
        "Add your first todo",
        "Tap the plus button to capture your first task.",
        None,
        None,
    )?;
    Ok(vec![first, second])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_db() -> (tempfile::TempDir, Connection) {
        let temp = tempfile::tempdir().expect("tempdir");
        let conn = open(&temp.path().join("whatsnext")).expect("open db");
        (temp, conn)
    }

    #[test]
    fn insert_rejects_blank_title_and_bad_importance() {
        let (_temp, conn) = open_test_db();

        assert!(insert_item(&conn, "a", "owner", "  ", "", None, None).is_err());
        assert!(insert_item(&conn, "a", "owner", "ok", "", None, Some(11)).is_err());
        assert!(insert_item(&conn, "a", "owner", "ok", "", None, Some(-1)).is_err());
        assert!(insert_item(&conn, "a", "owner", "ok", "", None, Some(10)).is_ok());
    }

    #[test]
    fn modify_missing_id_is_noop() {
        let (_temp, conn) = open_test_db();

        let patched = modify_item(
            &conn,
            "missing",
            &ItemPatch {
                is_completed: Some(true),
                ..ItemPatch::default()
            },
        )
        .expect("modify");
        assert!(patched.is_none());
    }

    #[test]
    fn patch_can_clear_nullable_fields() {
        let (_temp, conn) = open_test_db();

        insert_item(&conn, "a", "owner", "task", "", Some(1_000), Some(5)).expect("insert");
        let patched = modify_item(
            &conn,
            "a",
            &ItemPatch {
                due_at_ms: Some(None),
                importance: Some(None),
                ..ItemPatch::default()
            },
        )
        .expect("modify")
        .expect("item exists");

        assert_eq!(patched.due_at_ms, None);
        assert_eq!(patched.importance, None);
        assert!(!patched.is_synced);
    }
}
