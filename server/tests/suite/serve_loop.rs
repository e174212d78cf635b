//! Full-stack test: real fs commands behind the line-oriented JSON-RPC
//! serve loop, the way an external driver sees the system.

use std::sync::Arc;

use agentrun_core::checkpoint::FileCheckpointManager;
use agentrun_core::events::MemoryBus;
use agentrun_core::platform::register_builtin_commands;
use agentrun_core::sandbox::{Sandbox, SandboxPolicy};
use agentrun_core::{ContextStore, Registry};
use agentrun_protocol::Handler;
use agentrun_server::{register_methods, serve_lines, AgentSession};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::watch;

struct Stack {
    handler: Arc<Handler>,
    workdir: TempDir,
    _state_dir: TempDir,
}

fn stack() -> Stack {
    let workdir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();

    let sandbox = Arc::new(
        Sandbox::new(&SandboxPolicy {
            allowed_paths: vec![workdir.path().to_path_buf()],
            denied_paths: Vec::new(),
            max_file_size: "1MB".to_string(),
        })
        .unwrap(),
    );

    let registry = Arc::new(Registry::new());
    register_builtin_commands(&registry, sandbox).unwrap();

    let store = Arc::new(ContextStore::in_memory().unwrap());
    let bus = Arc::new(MemoryBus::new());
    let checkpoints =
        Arc::new(FileCheckpointManager::new(&state_dir.path().join("checkpoints")).unwrap());

    let session = Arc::new(AgentSession::new(registry, store, bus, checkpoints));
    let handler = Arc::new(Handler::new());
    register_methods(&handler, session);

    Stack {
        handler,
        workdir,
        _state_dir: state_dir,
    }
}

/// Feed request lines through the serve loop and collect response values.
async fn drive(stack: &Stack, requests: &[Value]) -> Vec<Value> {
    let script: String = requests
        .iter()
        .map(|r| format!("{r}\n"))
        .collect::<Vec<_>>()
        .join("");

    let (_tx, rx) = watch::channel(false);
    let mut output = Vec::new();
    serve_lines(
        Arc::clone(&stack.handler),
        script.as_bytes(),
        &mut output,
        rx,
    )
    .await
    .unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn write_then_read_with_verification_over_the_wire() {
    let stack = stack();
    let report = stack.workdir.path().join("report.md");
    let report = report.display().to_string();

    let responses = drive(
        &stack,
        &[
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "execute",
                "params": {
                    "command": "fs:write",
                    "args": {"path": report, "content": "## Summary\nall good\n"},
                },
            }),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "execute",
                "params": {
                    "command": "fs:read",
                    "args": {"path": report},
                    "verify": [
                        {"type": "not_empty"},
                        {"type": "contains", "expected": "## Summary"},
                        {"type": "count_gte", "target": "output.lines", "expected": 2},
                    ],
                },
            }),
        ],
    )
    .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["result"]["payload"]["bytes_written"], json!(20));
    assert_eq!(
        responses[1]["result"]["payload"],
        json!("## Summary\nall good\n")
    );
    assert_eq!(
        responses[1]["result"]["verification"]["passed"],
        json!(true)
    );
    assert_eq!(responses[1]["id"], json!(2));
}

#[tokio::test]
async fn sandbox_denial_surfaces_as_command_failed() {
    let stack = stack();
    let outside = TempDir::new().unwrap();
    let path = outside.path().join("escape.txt").display().to_string();

    let responses = drive(
        &stack,
        &[json!({
            "jsonrpc": "2.0", "id": 1, "method": "execute",
            "params": {
                "command": "fs:write",
                "args": {"path": path, "content": "nope"},
            },
        })],
    )
    .await;

    let error = &responses[0]["error"];
    assert_eq!(error["code"], json!(-32001));
    assert!(error["message"].as_str().unwrap().contains("allowed path"));
}

#[tokio::test]
async fn context_checkpoint_and_history_session() {
    let stack = stack();

    let responses = drive(
        &stack,
        &[
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "context.set",
                "params": {"scope": "session", "key": "phase", "value": "gather"},
            }),
            json!({
                "jsonrpc": "2.0", "id": 2, "method": "checkpoint.save",
                "params": {"name": "phase-gather"},
            }),
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "context.set",
                "params": {"scope": "session", "key": "phase", "value": "write"},
            }),
            json!({
                "jsonrpc": "2.0", "id": 4, "method": "checkpoint.restore",
                "params": {"name": "phase-gather"},
            }),
            json!({
                "jsonrpc": "2.0", "id": 5, "method": "context.get",
                "params": {"scope": "session", "key": "phase"},
            }),
            json!({"jsonrpc": "2.0", "id": 6, "method": "history"}),
        ],
    )
    .await;

    assert_eq!(responses[4]["result"], json!("gather"));

    let kinds: Vec<&str> = responses[5]["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"context.change"));
    assert!(kinds.contains(&"checkpoint.save"));
    assert!(kinds.contains(&"checkpoint.restore"));
}

#[tokio::test]
async fn pipeline_of_fs_commands_chains_envelopes() {
    let stack = stack();
    let dir = stack.workdir.path().display().to_string();
    for name in ["a.txt", "b.txt", "c.txt"] {
        std::fs::write(stack.workdir.path().join(name), name).unwrap();
    }

    // fs:list output (an array of entries) feeds count_gte on the payload.
    let responses = drive(
        &stack,
        &[json!({
            "jsonrpc": "2.0", "id": 1, "method": "execute",
            "params": {
                "command": "fs:list",
                "args": {"path": dir},
                "verify": [{"type": "count_gte", "expected": 3}],
            },
        })],
    )
    .await;

    let result = &responses[0]["result"];
    assert_eq!(result["payload"].as_array().unwrap().len(), 3);
    assert_eq!(result["verification"]["passed"], json!(true));
    assert_eq!(result["meta"]["tags"]["count"], json!("3"));
}
