//! The uniform platform-command contract.
//!
//! A command is a named, schema-bearing unit executed by the pipeline. The
//! core only ever invokes commands through this interface; concrete commands
//! may reach external systems.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::envelope::Envelope;
use crate::sandbox::SandboxError;
use crate::store::{ContextStore, StoreError};

/// A field within a command schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

/// Simplified JSON-schema-like description of a command's input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Schema {
    /// An object schema with no fields yet.
    pub fn object() -> Self {
        Self {
            kind: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: &str, kind: &str, description: &str) -> Self {
        self.properties.insert(
            name.to_string(),
            SchemaField {
                kind: kind.to_string(),
                description: description.to_string(),
            },
        );
        self
    }

    pub fn with_required(mut self, names: &[&str]) -> Self {
        self.required = names.iter().map(|n| n.to_string()).collect();
        self
    }
}

/// Errors surfaced by command execution.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Registry(#[from] crate::registry::RegistryError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The contract every platform command implements.
///
/// Identity is the full name (`namespace:name` or `namespace:sub:name`);
/// execution turns an input envelope into an output envelope, with the
/// scoped store available as a side channel.
#[async_trait]
pub trait PlatformCommand: Send + Sync {
    fn name(&self) -> &str;
    fn namespace(&self) -> &str;
    fn description(&self) -> &str;

    fn input_schema(&self) -> Schema;
    fn output_schema(&self) -> Schema;

    /// Credential identifiers this command needs before it can run.
    fn required_credentials(&self) -> Vec<String> {
        Vec::new()
    }

    /// Execute the command. Implementations must return promptly with
    /// [`CommandError::Cancelled`] when the token fires.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        input: Envelope,
        store: &ContextStore,
    ) -> Result<Envelope, CommandError>;
}

impl std::fmt::Debug for dyn PlatformCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCommand")
            .field("name", &self.name())
            .finish()
    }
}
