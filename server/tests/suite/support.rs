//! Shared fixtures for server integration tests.

use std::sync::Arc;

use agentrun_core::checkpoint::FileCheckpointManager;
use agentrun_core::command::{CommandError, PlatformCommand, Schema};
use agentrun_core::envelope::Envelope;
use agentrun_core::events::MemoryBus;
use agentrun_core::{ContextStore, Registry};
use agentrun_protocol::Handler;
use agentrun_server::{register_methods, AgentSession};
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// A stub command that returns a fixed payload.
pub struct StaticCommand {
    pub name: String,
    pub namespace: String,
    pub output: Value,
}

impl StaticCommand {
    pub fn new(name: &str, output: Value) -> Self {
        let namespace = name.split(':').next().unwrap_or_default().to_string();
        Self {
            name: name.to_string(),
            namespace,
            output,
        }
    }
}

#[async_trait]
impl PlatformCommand for StaticCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn description(&self) -> &str {
        "static test command"
    }

    fn input_schema(&self) -> Schema {
        Schema::object().with_property("path", "string", "Unused")
    }

    fn output_schema(&self) -> Schema {
        Schema::object()
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        _input: Envelope,
        _store: &ContextStore,
    ) -> Result<Envelope, CommandError> {
        Ok(Envelope::new(
            self.output.clone(),
            "application/json",
            &self.name,
        ))
    }
}

/// Everything a test needs to drive the session over the wire contract.
pub struct Fixture {
    pub handler: Arc<Handler>,
    pub session: Arc<AgentSession>,
    pub bus: Arc<MemoryBus>,
    pub store: Arc<ContextStore>,
    pub registry: Arc<Registry>,
    _state_dir: TempDir,
}

impl Fixture {
    pub fn new(commands: &[(&str, Value)]) -> Self {
        let state_dir = TempDir::new().unwrap();
        let registry = Arc::new(Registry::new());
        for (name, output) in commands {
            registry
                .register(Arc::new(StaticCommand::new(name, output.clone())))
                .unwrap();
        }

        let store = Arc::new(ContextStore::in_memory().unwrap());
        let bus = Arc::new(MemoryBus::new());
        let checkpoints =
            Arc::new(FileCheckpointManager::new(&state_dir.path().join("checkpoints")).unwrap());

        let session = Arc::new(AgentSession::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&bus),
            checkpoints,
        ));

        let handler = Arc::new(Handler::new());
        register_methods(&handler, Arc::clone(&session));

        Self {
            handler,
            session,
            bus,
            store,
            registry,
            _state_dir: state_dir,
        }
    }

    /// Dispatch a request and return the parsed response value.
    pub async fn call(&self, method: &str, params: Value) -> Value {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .handler
            .handle_raw(request.to_string().as_bytes())
            .await;
        serde_json::to_value(&response).unwrap()
    }
}

/// Write a spec file into a temp dir and return (dir, path-as-string).
pub fn write_spec(contents: &str) -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("project.yaml");
    std::fs::write(&path, contents).unwrap();
    let path = path.display().to_string();
    (dir, path)
}
