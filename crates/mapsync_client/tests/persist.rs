use std::fs;

use mapsync_client::{ViewStateStore, STATE_FILENAME};
use pretty_assertions::assert_eq;

#[test]
fn conversation_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = ViewStateStore::open(dir.path());
    assert_eq!(store.load_conversation("P1"), None);

    store.save_conversation("P1", Some(42)).unwrap();
    store.save_conversation("P2", Some(7)).unwrap();

    let reopened = ViewStateStore::open(dir.path());
    assert_eq!(reopened.load_conversation("P1"), Some(42));
    assert_eq!(reopened.load_conversation("P2"), Some(7));
    assert_eq!(reopened.path(), dir.path().join(STATE_FILENAME));
}

#[test]
fn clearing_a_selection_only_touches_that_project() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = ViewStateStore::open(dir.path());
    store.save_conversation("P1", Some(1)).unwrap();
    store.save_conversation("P2", Some(2)).unwrap();
    store.save_conversation("P1", None).unwrap();

    let reopened = ViewStateStore::open(dir.path());
    assert_eq!(reopened.load_conversation("P1"), None);
    assert_eq!(reopened.load_conversation("P2"), Some(2));
}

#[test]
fn corrupt_state_starts_empty_and_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(STATE_FILENAME), "not ron at all {").unwrap();

    let mut store = ViewStateStore::open(dir.path());
    assert_eq!(store.load_conversation("P1"), None);
    store.save_conversation("P1", Some(3)).unwrap();

    let text = fs::read_to_string(dir.path().join(STATE_FILENAME)).unwrap();
    assert!(text.contains("\"P1\""), "{text}");
    assert_eq!(ViewStateStore::open(dir.path()).load_conversation("P1"), Some(3));
}

#[test]
fn state_dir_is_created_on_first_save() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let mut store = ViewStateStore::open(&nested);
    store.save_conversation("P1", Some(9)).unwrap();
    assert!(nested.join(STATE_FILENAME).is_file());
}
