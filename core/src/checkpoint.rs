//! Named snapshots of the context store, with diffing and rollback support.
//!
//! One JSON file per snapshot in a manager-owned directory; file modification
//! time is authoritative for ordering. Snapshots are immutable once saved.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::store::{ContextStore, Scope, StoreError};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint not found: {0}")]
    NotFound(String),

    #[error("checkpoint {name} is corrupt: {source}")]
    Corrupt {
        name: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("checkpoint encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Full state captured at a point in time: every scope's entries plus an
/// optional content digest of the working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub context_state: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workdir_digest: String,
    pub timestamp: DateTime<Utc>,
}

/// Metadata about a saved checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// A single difference between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub scope: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
}

/// Stores checkpoints as JSON files in a directory.
pub struct FileCheckpointManager {
    dir: PathBuf,
}

impl FileCheckpointManager {
    pub fn new(dir: &Path) -> Result<Self, CheckpointError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Persist a snapshot under the given name, atomically.
    pub fn save(&self, name: &str, snapshot: &SessionSnapshot) -> Result<(), CheckpointError> {
        let data = serde_json::to_vec(snapshot)?;
        let path = self.path_for(name);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &data)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load a snapshot by name.
    pub fn restore(&self, name: &str) -> Result<SessionSnapshot, CheckpointError> {
        let path = self.path_for(name);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&data).map_err(|source| CheckpointError::Corrupt {
            name: name.to_string(),
            source,
        })
    }

    /// All saved checkpoints, sorted by timestamp ascending.
    pub fn list(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut infos = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(infos),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = entry.metadata()?.modified()?;
            infos.push(CheckpointInfo {
                name: name.to_string(),
                timestamp: DateTime::<Utc>::from(modified),
            });
        }

        infos.sort_by_key(|info| info.timestamp);
        Ok(infos)
    }

    /// Differences between two saved checkpoints, `a` as the before side.
    pub fn diff(&self, a: &str, b: &str) -> Result<Vec<Change>, CheckpointError> {
        let before = self.restore(a)?;
        let after = self.restore(b)?;
        Ok(diff_snapshots(&before, &after))
    }
}

/// Compare two snapshots. A value counts as modified iff the string
/// renderings differ.
pub fn diff_snapshots(a: &SessionSnapshot, b: &SessionSnapshot) -> Vec<Change> {
    let mut changes = Vec::new();

    let mut scopes: Vec<&String> = a.context_state.keys().chain(b.context_state.keys()).collect();
    scopes.sort();
    scopes.dedup();

    for scope in scopes {
        let empty = BTreeMap::new();
        let before = a.context_state.get(scope).unwrap_or(&empty);
        let after = b.context_state.get(scope).unwrap_or(&empty);

        for (key, val_a) in before {
            match after.get(key) {
                None => changes.push(Change {
                    scope: scope.clone(),
                    key: key.clone(),
                    before: Some(val_a.clone()),
                    after: None,
                    kind: ChangeKind::Removed,
                }),
                Some(val_b) if render(val_a) != render(val_b) => changes.push(Change {
                    scope: scope.clone(),
                    key: key.clone(),
                    before: Some(val_a.clone()),
                    after: Some(val_b.clone()),
                    kind: ChangeKind::Modified,
                }),
                Some(_) => {}
            }
        }

        for (key, val_b) in after {
            if !before.contains_key(key) {
                changes.push(Change {
                    scope: scope.clone(),
                    key: key.clone(),
                    before: None,
                    after: Some(val_b.clone()),
                    kind: ChangeKind::Added,
                });
            }
        }
    }

    changes
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Capture a snapshot of the live store: every reserved scope that holds data
/// except the append-only history surface, plus an optional workdir digest.
pub fn capture_snapshot(
    store: &ContextStore,
    workdir: Option<&Path>,
) -> Result<SessionSnapshot, CheckpointError> {
    let mut context_state = BTreeMap::new();
    for scope in [Scope::Project, Scope::Session, Scope::Step] {
        let entries = store.list(scope)?;
        if !entries.is_empty() {
            context_state.insert(scope.as_str().to_string(), entries);
        }
    }

    let workdir_digest = match workdir {
        Some(dir) => hash_dir(dir).unwrap_or_default(),
        None => String::new(),
    };

    Ok(SessionSnapshot {
        context_state,
        workdir_digest,
        timestamp: Utc::now(),
    })
}

/// Write a snapshot back into the store. Keys present in the snapshot are
/// overwritten; keys that exist only in the live store are left in place.
pub fn restore_snapshot(
    store: &ContextStore,
    snapshot: &SessionSnapshot,
) -> Result<(), CheckpointError> {
    for (scope, entries) in &snapshot.context_state {
        let scope = Scope::from_str(scope)?;
        for (key, value) in entries {
            store.set(scope, key, value.clone())?;
        }
    }
    Ok(())
}

/// Content-address a directory tree by hashing `rel_path:size:mtime` triples
/// in sorted walk order. Unreadable entries are skipped.
pub fn hash_dir(dir: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    hash_dir_into(dir, dir, &mut hasher)?;
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

fn hash_dir_into(root: &Path, dir: &Path, hasher: &mut Sha256) -> std::io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(Result::ok).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        let rel = path.strip_prefix(root).unwrap_or(&path);
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        hasher.update(format!("{}:{}:{}\n", rel.display(), meta.len(), mtime));
        if meta.is_dir() {
            hash_dir_into(root, &path, hasher)?;
        }
    }
    Ok(())
}

/// Adapter that lets the pipeline request named saves of the live store.
pub trait Checkpointer: Send + Sync {
    fn save(&self, name: &str) -> Result<(), CheckpointError>;
}

/// The standard checkpointer: captures the store (and optional workdir) and
/// hands the snapshot to a [`FileCheckpointManager`].
pub struct StoreCheckpointer {
    manager: Arc<FileCheckpointManager>,
    store: Arc<ContextStore>,
    workdir: Option<PathBuf>,
}

impl StoreCheckpointer {
    pub fn new(
        manager: Arc<FileCheckpointManager>,
        store: Arc<ContextStore>,
        workdir: Option<PathBuf>,
    ) -> Self {
        Self {
            manager,
            store,
            workdir,
        }
    }
}

impl Checkpointer for StoreCheckpointer {
    fn save(&self, name: &str) -> Result<(), CheckpointError> {
        let snapshot = capture_snapshot(&self.store, self.workdir.as_deref())?;
        self.manager.save(name, &snapshot)
    }
}
