//! Filesystem commands: `fs:read`, `fs:write`, `fs:list`.
//!
//! Every path crosses the sandbox policy before any file IO happens, and
//! writes additionally clear the file-size check.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::command::{CommandError, PlatformCommand, Schema};
use crate::envelope::Envelope;
use crate::sandbox::Sandbox;
use crate::store::ContextStore;

/// `fs:read`: read the contents of a file.
pub struct ReadCommand {
    sandbox: Arc<Sandbox>,
}

impl ReadCommand {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl PlatformCommand for ReadCommand {
    fn name(&self) -> &str {
        "fs:read"
    }

    fn namespace(&self) -> &str {
        "fs"
    }

    fn description(&self) -> &str {
        "Read file contents"
    }

    fn input_schema(&self) -> Schema {
        Schema::object()
            .with_property("path", "string", "File path to read")
            .with_required(&["path"])
    }

    fn output_schema(&self) -> Schema {
        Schema::object().with_property("content", "string", "File contents")
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        input: Envelope,
        _store: &ContextStore,
    ) -> Result<Envelope, CommandError> {
        let path = extract_path(&input.payload)
            .ok_or_else(|| invalid_payload("fs:read", &input.payload))?;
        self.sandbox.check_path(&path)?;

        let data = std::fs::read(&path)?;
        if let Err(err) = self.sandbox.check_file_size(data.len() as u64) {
            return Err(err.into());
        }
        let content = String::from_utf8_lossy(&data).into_owned();

        let mut env = Envelope::new(Value::String(content), "text/plain", "fs:read");
        env.meta
            .tags
            .insert("path".to_string(), path.display().to_string());
        env.meta
            .tags
            .insert("size".to_string(), data.len().to_string());
        Ok(env)
    }
}

/// `fs:write`: write content to a file.
pub struct WriteCommand {
    sandbox: Arc<Sandbox>,
}

impl WriteCommand {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl PlatformCommand for WriteCommand {
    fn name(&self) -> &str {
        "fs:write"
    }

    fn namespace(&self) -> &str {
        "fs"
    }

    fn description(&self) -> &str {
        "Write content to a file"
    }

    fn input_schema(&self) -> Schema {
        Schema::object()
            .with_property("path", "string", "File path to write")
            .with_property("content", "string", "Content to write")
            .with_required(&["path", "content"])
    }

    fn output_schema(&self) -> Schema {
        Schema::object()
            .with_property("path", "string", "Written file path")
            .with_property("bytes_written", "integer", "Number of bytes written")
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        input: Envelope,
        _store: &ContextStore,
    ) -> Result<Envelope, CommandError> {
        let (path, content) = extract_write_params(&input.payload)
            .ok_or_else(|| invalid_payload("fs:write", &input.payload))?;
        self.sandbox.check_path(&path)?;
        self.sandbox.check_file_size(content.len() as u64)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content.as_bytes())?;

        let mut env = Envelope::new(
            json!({
                "path": path.display().to_string(),
                "bytes_written": content.len(),
            }),
            "application/json",
            "fs:write",
        );
        env.meta
            .tags
            .insert("path".to_string(), path.display().to_string());
        Ok(env)
    }
}

/// `fs:list`: list files in a directory.
pub struct ListCommand {
    sandbox: Arc<Sandbox>,
}

impl ListCommand {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl PlatformCommand for ListCommand {
    fn name(&self) -> &str {
        "fs:list"
    }

    fn namespace(&self) -> &str {
        "fs"
    }

    fn description(&self) -> &str {
        "List files in a directory"
    }

    fn input_schema(&self) -> Schema {
        Schema::object()
            .with_property("path", "string", "Directory path to list")
            .with_required(&["path"])
    }

    fn output_schema(&self) -> Schema {
        Schema::object().with_property("files", "array", "List of file entries")
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        input: Envelope,
        _store: &ContextStore,
    ) -> Result<Envelope, CommandError> {
        let dir = match &input.payload {
            Value::Null => PathBuf::from("."),
            Value::String(s) if s.is_empty() => PathBuf::from("."),
            other => {
                extract_path(other).ok_or_else(|| invalid_payload("fs:list", &input.payload))?
            }
        };
        self.sandbox.check_path(&dir)?;

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let Ok(entry) = entry else { continue };
            let Ok(meta) = entry.metadata() else { continue };
            files.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "path": entry.path().display().to_string(),
                "size": meta.len(),
                "is_dir": meta.is_dir(),
            }));
        }
        files.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        let count = files.len();
        let mut env = Envelope::new(Value::Array(files), "application/json", "fs:list");
        env.meta
            .tags
            .insert("dir".to_string(), dir.display().to_string());
        env.meta.tags.insert("count".to_string(), count.to_string());
        Ok(env)
    }
}

/// Pull a path out of a string payload or a map with a `path` key.
fn extract_path(payload: &Value) -> Option<PathBuf> {
    match payload {
        Value::String(s) if !s.is_empty() => Some(PathBuf::from(s)),
        Value::Object(map) => map
            .get("path")
            .and_then(Value::as_str)
            .map(PathBuf::from),
        _ => None,
    }
}

/// Pull `path` and `content` out of a map payload.
fn extract_write_params(payload: &Value) -> Option<(PathBuf, String)> {
    let map = payload.as_object()?;
    let path = map.get("path").and_then(Value::as_str)?;
    let content = map.get("content").and_then(Value::as_str)?;
    Some((PathBuf::from(path), content.to_string()))
}

fn invalid_payload(command: &str, payload: &Value) -> CommandError {
    CommandError::InvalidInput(format!(
        "{command}: cannot extract parameters from payload of type {}",
        type_name(payload)
    ))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
