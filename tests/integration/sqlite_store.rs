//! SQLite snapshot store persistence across reopen.

use gradewatch::store::{SnapshotStore, SqliteSnapshotStore, StoreError};
use gradewatch::{GradeTable, UserKey};

use crate::helpers::{configured, midterms};

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("watch.db");

    {
        let store = SqliteSnapshotStore::open(&db).unwrap();
        configured(&store, 1, true, Some(&midterms("80")));
        configured(&store, 2, false, None);
        store.set_credential(UserKey(3), "SESSION=only-cookie").unwrap();
    }

    let store = SqliteSnapshotStore::open(&db).unwrap();
    assert_eq!(store.user_count().unwrap(), 3);

    let first = store.get(UserKey(1)).unwrap().unwrap();
    assert!(first.alarm_enabled);
    assert_eq!(first.term, "2024-1");
    assert_eq!(first.snapshot, Some(midterms("80")));
    assert!(first.last_checked_at.is_some());

    let second = store.get(UserKey(2)).unwrap().unwrap();
    assert!(second.snapshot.is_none());

    let third = store.get(UserKey(3)).unwrap().unwrap();
    assert!(!third.is_configured());

    assert_eq!(store.list_eligible().unwrap(), vec![UserKey(1)]);
}

#[test]
fn snapshot_replace_is_whole_table() {
    let store = SqliteSnapshotStore::open_in_memory().unwrap();
    let user = configured(&store, 9, true, Some(&midterms("80")));

    let replacement = GradeTable::new().with("MATH201", "Final", "CC");
    store.put_snapshot(user, &replacement).unwrap();

    assert_eq!(
        store.get(user).unwrap().unwrap().snapshot,
        Some(replacement)
    );
}

#[test]
fn snapshot_for_unknown_user_is_rejected() {
    let store = SqliteSnapshotStore::open_in_memory().unwrap();
    let err = store
        .put_snapshot(UserKey(404), &midterms("80"))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(UserKey(404))));
    assert!(store.get(UserKey(404)).unwrap().is_none());
}

#[test]
fn alarm_toggle_requires_a_record() {
    let store = SqliteSnapshotStore::open_in_memory().unwrap();
    assert!(!store.set_alarm(UserKey(5), true).unwrap());

    store.set_term(UserKey(5), "2024-1").unwrap();
    assert!(store.set_alarm(UserKey(5), true).unwrap());
    // Alarm on but no cookie yet: not eligible.
    assert!(store.list_eligible().unwrap().is_empty());
}
