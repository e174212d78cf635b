//! Scoped, durable key-value storage for pipeline state.
//!
//! Values are JSON-encoded into a SQLite file keyed by `(scope, key)` and
//! mirrored in memory so that readers proceed in parallel while writes are
//! exclusive and write-through. The file is owned by a single process.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, RwLock};

use rusqlite::Connection;
use serde_json::Value;
use thiserror::Error;

/// The closed set of store scopes, each with a distinct lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// Goals, constraints, guidelines; loaded from the spec, stable per run.
    Project,
    /// Accumulating working memory of the current run.
    Session,
    /// Current pipeline step context; overwritten each step.
    Step,
    /// Append-only log surface.
    History,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Scope::Project, Scope::Session, Scope::Step, Scope::History];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Project => "project",
            Scope::Session => "session",
            Scope::Step => "step",
            Scope::History => "history",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Scope::Project),
            "session" => Ok(Scope::Session),
            "step" => Ok(Scope::Step),
            "history" => Ok(Scope::History),
            other => Err(StoreError::UnknownScope(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown scope: {0}")]
    UnknownScope(String),

    #[error("key not found: {scope}/{key}")]
    KeyNotFound { scope: Scope, key: String },

    #[error("store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store value encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

type ScopeMap = HashMap<Scope, BTreeMap<String, Value>>;

/// Durable scoped key-value store.
pub struct ContextStore {
    state: RwLock<ScopeMap>,
    conn: Mutex<Connection>,
}

impl ContextStore {
    /// Open (or create) a store at the given path. The four reserved scopes
    /// are created if missing and any persisted entries are loaded.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory store with no backing file (used in tests and by
    /// callers that do not need durability).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS context (
                 scope TEXT NOT NULL,
                 key   TEXT NOT NULL,
                 value TEXT NOT NULL,
                 PRIMARY KEY (scope, key)
             );",
        )?;

        let mut state: ScopeMap = Scope::ALL
            .iter()
            .map(|s| (*s, BTreeMap::new()))
            .collect();

        {
            let mut stmt = conn.prepare("SELECT scope, key, value FROM context")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let scope: String = row.get(0)?;
                let key: String = row.get(1)?;
                let raw: String = row.get(2)?;
                let scope = Scope::from_str(&scope)?;
                let value: Value = serde_json::from_str(&raw)?;
                state.entry(scope).or_default().insert(key, value);
            }
        }

        Ok(Self {
            state: RwLock::new(state),
            conn: Mutex::new(conn),
        })
    }

    /// Fetch a value. Fails with [`StoreError::KeyNotFound`] if absent.
    pub fn get(&self, scope: Scope, key: &str) -> Result<Value, StoreError> {
        let state = self.state.read().expect("store lock poisoned");
        state
            .get(&scope)
            .and_then(|entries| entries.get(key))
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound {
                scope,
                key: key.to_string(),
            })
    }

    /// Upsert a value. The write hits the backing file before the in-memory
    /// image is updated, so a persisted read never trails memory.
    pub fn set(&self, scope: Scope, key: &str, value: Value) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&value)?;
        {
            let conn = self.conn.lock().expect("store connection poisoned");
            conn.execute(
                "INSERT INTO context (scope, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (scope, key) DO UPDATE SET value = excluded.value",
                (scope.as_str(), key, &encoded),
            )?;
        }
        let mut state = self.state.write().expect("store lock poisoned");
        state.entry(scope).or_default().insert(key.to_string(), value);
        Ok(())
    }

    /// Delete a key. Deleting an absent key is not an error.
    pub fn delete(&self, scope: Scope, key: &str) -> Result<(), StoreError> {
        {
            let conn = self.conn.lock().expect("store connection poisoned");
            conn.execute(
                "DELETE FROM context WHERE scope = ?1 AND key = ?2",
                (scope.as_str(), key),
            )?;
        }
        let mut state = self.state.write().expect("store lock poisoned");
        state.entry(scope).or_default().remove(key);
        Ok(())
    }

    /// All entries of a scope.
    pub fn list(&self, scope: Scope) -> Result<BTreeMap<String, Value>, StoreError> {
        let state = self.state.read().expect("store lock poisoned");
        Ok(state.get(&scope).cloned().unwrap_or_default())
    }

    /// Flush and release the backing file.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .into_inner()
            .expect("store connection poisoned");
        conn.close().map_err(|(_, err)| StoreError::Sqlite(err))
    }
}
