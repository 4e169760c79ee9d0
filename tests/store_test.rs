// tests/store_test.rs
use build_stash::domain::VersionMarker;
use build_stash::resolver::StashRepository;
use build_stash::store::{FileLock, LocalStashStore, LockWait, TRANSACTION_LOCK};
use build_stash::StashError;
use std::fs;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn m(identifier: &str) -> VersionMarker {
    VersionMarker::parse_identifier(identifier).unwrap()
}

fn read(stash: &build_stash::store::Stash, path: &str) -> Option<String> {
    stash.get(path).unwrap().map(|mut file| {
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        content
    })
}

#[test]
fn test_pending_entries_are_private_to_their_handle() {
    let dir = TempDir::new().unwrap();
    let writer_store = LocalStashStore::with_root(dir.path()).unwrap();
    let reader_store = LocalStashStore::with_root(dir.path()).unwrap();
    let marker = m("abc1234@20.21.1-beta");

    let mut writer = writer_store.get_or_create_exact(&marker).unwrap();
    writer.store(Cursor::new("x"), "a.txt").unwrap();

    let reader = reader_store.get_or_create_exact(&marker).unwrap();
    assert_eq!(read(&writer, "a.txt").as_deref(), Some("x"));
    assert_eq!(read(&reader, "a.txt"), None);
    assert!(reader_store.list_all().unwrap().is_empty());

    writer.commit().unwrap();
    assert_eq!(read(&reader, "a.txt").as_deref(), Some("x"));
    assert_eq!(reader_store.list_all().unwrap(), vec![marker]);
}

#[test]
fn test_second_commit_of_same_path_conflicts() {
    let dir = TempDir::new().unwrap();
    let store = LocalStashStore::with_root(dir.path()).unwrap();
    let marker = m("abc1234@20.21.1-beta");

    let mut first = store.get_or_create_exact(&marker).unwrap();
    let mut second = store.get_or_create_exact(&marker).unwrap();
    first.store(Cursor::new("first"), "a.txt").unwrap();
    second.store(Cursor::new("second"), "a.txt").unwrap();
    second.store(Cursor::new("extra"), "b.txt").unwrap();

    first.commit().unwrap();
    let err = second.commit().unwrap_err();
    assert!(matches!(err, StashError::Conflict { .. }));
    assert!(err.is_storage());

    // Nothing of the conflicting commit was published
    let reader = store.get_or_create(&marker).unwrap();
    assert_eq!(read(&reader, "a.txt").as_deref(), Some("first"));
    assert_eq!(reader.list().unwrap(), vec![PathBuf::from("a.txt")]);
}

#[test]
fn test_disjoint_commits_merge() {
    let dir = TempDir::new().unwrap();
    let store = LocalStashStore::with_root(dir.path()).unwrap();
    let marker = m("abc1234@20.21.1-beta");

    let workers: Vec<_> = ["a.txt", "b/c.txt", "d.txt"]
        .into_iter()
        .map(|path| {
            let store = store.clone();
            let marker = marker.clone();
            thread::spawn(move || {
                let mut stash = store.get_or_create_exact(&marker).unwrap();
                stash.store(Cursor::new(path), path).unwrap();
                stash
                    .commit_with(&LockWait::Timeout(Duration::from_secs(10)))
                    .unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let stash = store.get_or_create(&marker).unwrap();
    assert_eq!(
        stash.list().unwrap(),
        vec![
            PathBuf::from("a.txt"),
            PathBuf::from("b/c.txt"),
            PathBuf::from("d.txt")
        ]
    );
    assert_eq!(read(&stash, "b/c.txt").as_deref(), Some("b/c.txt"));
}

#[test]
fn test_commit_waits_for_held_marker_lock() {
    let dir = TempDir::new().unwrap();
    let store = LocalStashStore::with_root(dir.path()).unwrap();
    let marker = m("abc1234@20.21.1-beta");
    fs::create_dir_all(store.transactions_dir()).unwrap();
    let held = FileLock::try_acquire(
        store
            .transactions_dir()
            .join(format!("{}.lock", marker.directory_name())),
    )
    .unwrap()
    .unwrap();

    let mut stash = store.get_or_create_exact(&marker).unwrap();
    stash.store(Cursor::new("x"), "a.txt").unwrap();
    let err = stash.commit_with(&LockWait::immediate()).unwrap_err();
    assert!(err.is_lock());
    assert!(!stash.exists());

    held.release().unwrap();
    stash.commit_with(&LockWait::immediate()).unwrap();
    assert!(stash.exists());
}

#[test]
fn test_gc_keeps_held_transaction_and_reclaims_released_one() {
    let dir = TempDir::new().unwrap();
    let store = LocalStashStore::with_root(dir.path()).unwrap();
    let gc = store.garbage_collector(Duration::ZERO);

    let mut live = store
        .get_or_create_exact(&m("abc1234@20.21.1-beta"))
        .unwrap();
    live.store(Cursor::new("x"), "a.txt").unwrap();
    let mut orphan = store
        .get_or_create_exact(&m("def5678@20.21.2-beta"))
        .unwrap();
    orphan.store(Cursor::new("y"), "a.txt").unwrap();

    // The orphan's writer went away without cleaning up
    let orphan_dir = orphan.transaction_dir().unwrap().to_path_buf();
    std::mem::forget(orphan);
    fs::remove_file(orphan_dir.join(TRANSACTION_LOCK)).unwrap();

    let report = gc.collect().unwrap();
    assert_eq!(report.transactions_removed, 1);
    assert_eq!(report.skipped, 1);
    assert!(!orphan_dir.exists());

    // The live handle still commits
    live.commit().unwrap();
    assert_eq!(read(&live, "a.txt").as_deref(), Some("x"));
}

#[test]
fn test_gc_never_touches_committed_stashes() {
    let dir = TempDir::new().unwrap();
    let store = LocalStashStore::with_root(dir.path()).unwrap();
    let marker = m("abc1234@20.21.1-beta");

    let mut stash = store.get_or_create_exact(&marker).unwrap();
    stash.store(Cursor::new("x"), "a.txt").unwrap();
    stash.commit().unwrap();
    drop(stash);

    store.garbage_collector(Duration::ZERO).collect().unwrap();
    assert_eq!(store.list_all().unwrap(), vec![marker]);
}

#[test]
fn test_rejects_paths_escaping_the_stash() {
    let dir = TempDir::new().unwrap();
    let store = LocalStashStore::with_root(dir.path()).unwrap();
    let mut stash = store
        .get_or_create_exact(&m("abc1234@20.21.1-beta"))
        .unwrap();

    assert!(matches!(
        stash.store(Cursor::new("x"), "../escape.txt"),
        Err(StashError::InvalidPath(_))
    ));
    assert!(stash.store(Cursor::new("x"), "/abs.txt").is_err());
}

#[test]
fn test_failed_commit_leaves_store_unchanged() {
    let dir = TempDir::new().unwrap();
    let store = LocalStashStore::with_root(dir.path()).unwrap();
    let marker = m("abc1234@20.21.1-beta");

    let mut first = store.get_or_create_exact(&marker).unwrap();
    first.store(Cursor::new("file"), "x").unwrap();
    first.commit().unwrap();
    let before = first.list().unwrap();

    let mut failing = store.get_or_create_exact(&marker).unwrap();
    failing.store(Cursor::new("c"), "b/c.txt").unwrap();
    failing.store(Cursor::new("y"), "x/y.txt").unwrap();
    let err = failing.commit().unwrap_err();
    assert!(matches!(err, StashError::Io(_)));
    assert_eq!(first.list().unwrap(), before);

    let mut retry = store.get_or_create_exact(&marker).unwrap();
    retry.store(Cursor::new("c"), "b/c.txt").unwrap();
    retry.commit().unwrap();
    assert_eq!(read(&retry, "b/c.txt").as_deref(), Some("c"));
}
