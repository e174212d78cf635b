//! The `agentrun` binary: configuration, component wiring, and the
//! stdin/stdout JSON-RPC serve loop, with the optional inspector alongside.

use std::path::PathBuf;
use std::sync::Arc;

use agentrun_core::checkpoint::FileCheckpointManager;
use agentrun_core::config::RuntimeConfig;
use agentrun_core::events::{Event, EventKind, MemoryBus};
use agentrun_core::platform::register_builtin_commands;
use agentrun_core::verify::{set_judge_endpoint, Engine};
use agentrun_core::{ContextStore, Registry, Sandbox};
use agentrun_inspector::Inspector;
use agentrun_protocol::Handler;
use agentrun_server::{register_methods, serve_stdio, AgentSession};
use anyhow::Context;
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("AGENTRUN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| RuntimeConfig::default_path());
    let config = RuntimeConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let state_dir = PathBuf::from(".agentrun");
    std::fs::create_dir_all(&state_dir).context("creating state directory")?;

    let sandbox = Arc::new(Sandbox::new(&config.sandbox.policy()).context("building sandbox")?);
    let registry = Arc::new(Registry::new());
    register_builtin_commands(&registry, Arc::clone(&sandbox))
        .context("registering built-in commands")?;

    let store = Arc::new(
        ContextStore::open(&state_dir.join("context.db")).context("opening context store")?,
    );
    let bus = Arc::new(MemoryBus::with_history_capacity(config.history.max_entries));
    let checkpoints = Arc::new(
        FileCheckpointManager::new(&state_dir.join("checkpoints"))
            .context("opening checkpoint directory")?,
    );

    if !config.verify.llm_judge_endpoint.is_empty() {
        set_judge_endpoint(Some(config.verify.llm_judge_endpoint.clone()));
    }

    let session = Arc::new(
        AgentSession::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&checkpoints),
        )
        .with_engine(Engine::new().with_fail_fast(config.verify.fail_fast))
        .with_workdir(PathBuf::from(&config.sandbox.workdir)),
    );

    let handler = Arc::new(Handler::new());
    register_methods(&handler, Arc::clone(&session));

    if config.inspector.enabled {
        let (inspector, mut approvals) = Inspector::new(
            Arc::clone(&bus),
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&checkpoints),
        );
        let port = config.inspector.port;
        tokio::spawn(async move {
            if let Err(err) = inspector.serve(port).await {
                tracing::error!(error = %err, "inspector server exited");
            }
        });
        // Approval actions arrive from the inspector UI; in agent mode the
        // driving LLM owns approvals, so these are logged and surfaced on
        // the bus only.
        let approval_bus = Arc::clone(&bus);
        tokio::spawn(async move {
            while let Some(action) = approvals.recv().await {
                tracing::info!(action = %action.action, "approval action from inspector");
                approval_bus.publish(Event::new(
                    EventKind::AgentMessage,
                    json!({ "message": "inspector approval action", "action": action.action }),
                ));
            }
        });
        tracing::info!(port, "inspector enabled on localhost");
    }

    bus.publish(Event::new(
        EventKind::AgentMessage,
        json!({ "message": "agent mode started", "methods": handler.methods() }),
    ));

    serve_stdio(handler).await.context("serve loop failed")?;

    session.cancellation_token().cancel();
    Ok(())
}
