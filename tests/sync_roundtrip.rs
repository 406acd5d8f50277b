use whatsnext_core::db;
use whatsnext_core::sync::{self, InMemoryRemoteStore, RemoteStore, TodoItemDto};

#[test]
fn first_sync_pulls_a_remote_item_into_an_empty_store() {
    let temp = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&temp.path().join("whatsnext")).expect("open db");
    let remote = InMemoryRemoteStore::new();

    remote
        .seed_item(
            "owner",
            "x",
            &TodoItemDto {
                title: "from another device".to_string(),
                detail: String::new(),
                due_at_ms: None,
                is_completed: false,
                last_modified_ms: 100,
                is_deleted: false,
            },
        )
        .expect("seed remote");

    let before = sync::last_sync_ms(&conn, "owner").expect("checkpoint");
    assert_eq!(before, 0);

    let outcome = sync::sync(&conn, &remote, "owner").expect("sync");
    assert_eq!(outcome.pulled, 1);
    assert_eq!(outcome.applied, 1);

    let stored = db::get_item(&conn, "x").expect("get").expect("item exists");
    assert!(stored.is_synced);
    assert_eq!(stored.title, "from another device");

    let after = sync::last_sync_ms(&conn, "owner").expect("checkpoint");
    assert!(after > 0, "checkpoint should advance after a clean cycle");
}

#[test]
fn local_insert_round_trips_to_the_remote_collection() {
    let temp = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&temp.path().join("whatsnext")).expect("open db");
    let remote = InMemoryRemoteStore::new();

    let id = remote.generate_id();
    db::insert_item(&conn, &id, "owner", "pack passport", "", Some(7_000), Some(9))
        .expect("insert");

    let outcome = sync::sync(&conn, &remote, "owner").expect("sync");
    assert_eq!(outcome.pushed, 1);

    let doc = remote
        .document("owner", &id)
        .expect("read remote")
        .expect("document exists");
    assert_eq!(doc["title"].as_str(), Some("pack passport"));
    assert_eq!(doc["isDeleted"].as_bool(), Some(false));
    // Local-only fields stay local.
    assert!(doc.get("importance").is_none());

    let stored = db::get_item(&conn, &id).expect("get").expect("item exists");
    assert!(stored.is_synced);
    assert_eq!(stored.importance, Some(9));
}

#[test]
fn local_delete_pushes_a_tombstone_then_purges_the_row() {
    let temp = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&temp.path().join("whatsnext")).expect("open db");
    let remote = InMemoryRemoteStore::new();

    let id = remote.generate_id();
    db::insert_item(&conn, &id, "owner", "old plan", "", None, None).expect("insert");
    sync::sync(&conn, &remote, "owner").expect("first sync");

    db::delete_item(&conn, &id).expect("delete").expect("item exists");
    assert!(db::list_items(&conn, "owner").expect("list").is_empty());
    assert!(db::get_item(&conn, &id).expect("get").is_some());

    let outcome = sync::sync(&conn, &remote, "owner").expect("second sync");
    assert_eq!(outcome.purged, 1);

    // Tombstone visible remotely, row gone locally.
    let doc = remote
        .document("owner", &id)
        .expect("read remote")
        .expect("document exists");
    assert_eq!(doc["isDeleted"].as_bool(), Some(true));
    assert!(db::get_item(&conn, &id).expect("get").is_none());
}

#[test]
fn push_shallow_merges_into_the_remote_document() {
    let temp = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&temp.path().join("whatsnext")).expect("open db");
    let remote = InMemoryRemoteStore::new();

    let id = remote.generate_id();
    db::insert_item(&conn, &id, "owner", "draft", "", None, None).expect("insert");
    sync::sync(&conn, &remote, "owner").expect("first sync");

    // A field our DTO knows nothing about, as a future server version
    // might attach.
    remote
        .set_document_field("owner", &id, "serverRevision", serde_json::json!(17))
        .expect("annotate document");

    db::modify_item(
        &conn,
        &id,
        &db::ItemPatch {
            title: Some("draft v2".to_string()),
            ..db::ItemPatch::default()
        },
    )
    .expect("modify")
    .expect("item exists");
    sync::sync(&conn, &remote, "owner").expect("second sync");

    let doc = remote
        .document("owner", &id)
        .expect("read remote")
        .expect("document exists");
    assert_eq!(doc["title"].as_str(), Some("draft v2"));
    assert_eq!(doc["serverRevision"].as_i64(), Some(17));
}

#[test]
fn empty_push_batch_is_a_noop() {
    let temp = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&temp.path().join("whatsnext")).expect("open db");
    let remote = InMemoryRemoteStore::new();

    remote.push_items("owner", &[]).expect("empty push");
    assert_eq!(remote.push_batch_count(), 0);

    // A cycle with nothing to push never commits a batch either.
    sync::sync(&conn, &remote, "owner").expect("sync");
    assert_eq!(remote.push_batch_count(), 0);
}

#[test]
fn pulled_items_are_not_pushed_back_in_the_same_cycle() {
    let temp = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&temp.path().join("whatsnext")).expect("open db");
    let remote = InMemoryRemoteStore::new();

    remote
        .seed_item(
            "owner",
            "x",
            &TodoItemDto {
                title: "remote only".to_string(),
                detail: String::new(),
                due_at_ms: None,
                is_completed: false,
                last_modified_ms: 100,
                is_deleted: false,
            },
        )
        .expect("seed remote");

    let outcome = sync::sync(&conn, &remote, "owner").expect("sync");
    assert_eq!(outcome.applied, 1);
    assert_eq!(outcome.pushed, 0);
    assert_eq!(remote.push_batch_count(), 0);
}

#[test]
fn replaying_a_cycle_is_idempotent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&temp.path().join("whatsnext")).expect("open db");
    let remote = InMemoryRemoteStore::new();

    let id = remote.generate_id();
    db::insert_item(&conn, &id, "owner", "stable", "", None, None).expect("insert");
    sync::sync(&conn, &remote, "owner").expect("first sync");
    let first = db::get_item(&conn, &id).expect("get").expect("item exists");

    sync::sync(&conn, &remote, "owner").expect("second sync");
    let second = db::get_item(&conn, &id).expect("get").expect("item exists");
    assert_eq!(first, second);
}
