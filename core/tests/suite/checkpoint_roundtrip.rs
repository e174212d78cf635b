//! Checkpoint round-trip and rollback behavior against a real store and a
//! real checkpoint directory.

use std::sync::Arc;

use agentrun_core::checkpoint::{
    capture_snapshot, restore_snapshot, Checkpointer, FileCheckpointManager, StoreCheckpointer,
};
use agentrun_core::store::{ContextStore, Scope};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

#[test]
fn capture_restore_is_the_identity_on_captured_keys() {
    let store = ContextStore::in_memory().unwrap();
    store.set(Scope::Project, "goal", json!("report")).unwrap();
    store.set(Scope::Session, "items", json!([1, 2, 3])).unwrap();
    store.set(Scope::Step, "command", json!("fs:read")).unwrap();

    let snap = capture_snapshot(&store, None).unwrap();

    // Trash everything captured, then roll back.
    store.set(Scope::Project, "goal", json!("corrupted")).unwrap();
    store.set(Scope::Session, "items", json!(null)).unwrap();
    store.delete(Scope::Step, "command").unwrap();
    restore_snapshot(&store, &snap).unwrap();

    assert_eq!(store.get(Scope::Project, "goal").unwrap(), json!("report"));
    assert_eq!(store.get(Scope::Session, "items").unwrap(), json!([1, 2, 3]));
    assert_eq!(store.get(Scope::Step, "command").unwrap(), json!("fs:read"));
}

#[test]
fn snapshot_survives_disk_round_trip_through_manager() {
    let dir = TempDir::new().unwrap();
    let manager = FileCheckpointManager::new(dir.path()).unwrap();
    let store = ContextStore::in_memory().unwrap();
    store.set(Scope::Session, "nested", json!({"a": {"b": [true, null, 1.5]}})).unwrap();

    let snap = capture_snapshot(&store, None).unwrap();
    manager.save("pre-run", &snap).unwrap();
    let loaded = manager.restore("pre-run").unwrap();
    assert_eq!(loaded, snap);
}

#[test]
fn store_checkpointer_saves_named_snapshots() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(FileCheckpointManager::new(dir.path()).unwrap());
    let store = Arc::new(ContextStore::in_memory().unwrap());
    store.set(Scope::Session, "k", json!("v")).unwrap();

    let checkpointer =
        StoreCheckpointer::new(Arc::clone(&manager), Arc::clone(&store), None);
    checkpointer.save("step-1-fs:write").unwrap();

    let infos = manager.list().unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].name, "step-1-fs:write");

    let snap = manager.restore("step-1-fs:write").unwrap();
    assert_eq!(snap.context_state["session"]["k"], json!("v"));
}

#[test]
fn workdir_digest_is_attached_when_requested() {
    let workdir = TempDir::new().unwrap();
    std::fs::write(workdir.path().join("file.txt"), "content").unwrap();
    let store = ContextStore::in_memory().unwrap();

    let without = capture_snapshot(&store, None).unwrap();
    assert!(without.workdir_digest.is_empty());

    let with = capture_snapshot(&store, Some(workdir.path())).unwrap();
    assert_eq!(with.workdir_digest.len(), 64);

    // Same tree, same digest.
    let again = capture_snapshot(&store, Some(workdir.path())).unwrap();
    assert_eq!(with.workdir_digest, again.workdir_digest);
}

#[test]
fn diff_between_saved_checkpoints() {
    let dir = TempDir::new().unwrap();
    let manager = FileCheckpointManager::new(dir.path()).unwrap();
    let store = ContextStore::in_memory().unwrap();

    store.set(Scope::Session, "stable", json!("same")).unwrap();
    store.set(Scope::Session, "counter", json!(1)).unwrap();
    manager
        .save("before", &capture_snapshot(&store, None).unwrap())
        .unwrap();

    store.set(Scope::Session, "counter", json!(2)).unwrap();
    store.set(Scope::Session, "fresh", json!("added")).unwrap();
    manager
        .save("after", &capture_snapshot(&store, None).unwrap())
        .unwrap();

    let changes = manager.diff("before", "after").unwrap();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().any(|c| c.key == "counter"));
    assert!(changes.iter().any(|c| c.key == "fresh"));
    assert!(!changes.iter().any(|c| c.key == "stable"));
}
