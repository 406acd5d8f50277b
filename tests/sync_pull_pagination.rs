use whatsnext_core::db;
use whatsnext_core::sync::{self, InMemoryRemoteStore, PullCursor, RemoteStore, TodoItemDto};

fn seed(remote: &InMemoryRemoteStore, id: &str, last_modified_ms: i64) {
    remote
        .seed_item(
            "owner",
            id,
            &TodoItemDto {
                title: format!("item {id}"),
                detail: String::new(),
                due_at_ms: None,
                is_completed: false,
                last_modified_ms,
                is_deleted: false,
            },
        )
        .expect("seed remote");
}

#[test]
fn fetch_respects_limit_and_resumes_exactly_where_it_stopped() {
    let remote = InMemoryRemoteStore::new();
    // Three items share one timestamp so only the id tiebreak separates them.
    seed(&remote, "a", 100);
    seed(&remote, "b", 100);
    seed(&remote, "c", 100);
    seed(&remote, "d", 200);

    let mut cursor = PullCursor::since(0);
    let first = remote
        .fetch_updated_items("owner", &cursor, 2)
        .expect("first page");
    assert_eq!(
        first.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
        vec!["a", "b"]
    );

    let last = first.last().expect("non-empty page");
    cursor.advance(last.last_modified_ms, &last.id);
    let second = remote
        .fetch_updated_items("owner", &cursor, 2)
        .expect("second page");
    assert_eq!(
        second.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
        vec!["c", "d"]
    );
}

#[test]
fn fetch_filters_strictly_after_since() {
    let remote = InMemoryRemoteStore::new();
    seed(&remote, "old", 100);
    seed(&remote, "new", 101);

    let page = remote
        .fetch_updated_items("owner", &PullCursor::since(100), 10)
        .expect("fetch");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "new");
}

#[test]
fn sync_drains_more_than_one_page() {
    let temp = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&temp.path().join("whatsnext")).expect("open db");
    let remote = InMemoryRemoteStore::new();

    let total = sync::PULL_PAGE_SIZE + 5;
    for n in 0..total {
        // Identical timestamps across the page boundary on purpose.
        seed(&remote, &format!("item-{n:04}"), 1_000);
    }

    let outcome = sync::sync(&conn, &remote, "owner").expect("sync");
    assert_eq!(outcome.pulled as usize, total);
    assert_eq!(outcome.applied as usize, total);

    let items = db::list_items(&conn, "owner").expect("list");
    assert_eq!(items.len(), total);
    assert!(items.iter().all(|item| item.is_synced));
}
