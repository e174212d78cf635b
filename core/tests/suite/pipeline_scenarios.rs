//! End-to-end pipeline behavior: identity, chaining, error policy,
//! verification, and checkpoint-before.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use agentrun_core::checkpoint::{CheckpointError, Checkpointer};
use agentrun_core::envelope::Envelope;
use agentrun_core::events::{EventKind, MemoryBus};
use agentrun_core::pipeline::{
    CommandExecutor, Pipeline, PipelineStep, StepOutcome,
};
use agentrun_core::spec::OnError;
use agentrun_core::store::ContextStore;
use agentrun_core::verify::{
    Assertion, AssertionResult, Engine, Intent, IntentVerifier, StepVerifier,
};
use agentrun_core::CommandError;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Executor mapping command names to simple string transforms; `fail`
/// always errors.
struct ScriptedExecutor;

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        _cancel: &CancellationToken,
        name: &str,
        input: Envelope,
        _store: &ContextStore,
    ) -> Result<Envelope, CommandError> {
        let text = input.payload_as_string();
        let payload = match name {
            "upper" => json!(format!("UPPER:{text}")),
            "wrap" => json!(format!("[{text}]")),
            "after" => json!("reached"),
            "read" => json!("data"),
            "write" => json!("written"),
            "fail" => return Err(CommandError::Failed("always fails".to_string())),
            other => return Err(CommandError::Failed(format!("unknown command {other}"))),
        };
        Ok(Envelope::new(payload, "text/plain", name))
    }
}

fn step(command: &str) -> PipelineStep {
    PipelineStep::new(command)
}

fn input(payload: &str) -> Envelope {
    Envelope::new(json!(payload), "text/plain", "test")
}

fn pipeline(steps: Vec<PipelineStep>, store: Arc<ContextStore>) -> Pipeline {
    Pipeline::new(steps, store).with_executor(Arc::new(ScriptedExecutor))
}

#[tokio::test]
async fn empty_pipeline_is_identity() {
    let store = Arc::new(ContextStore::in_memory().unwrap());
    let bus = Arc::new(MemoryBus::new());
    let result = pipeline(vec![], Arc::clone(&store))
        .with_events(Arc::clone(&bus) as _)
        .run(&CancellationToken::new(), input("hello"))
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.steps.is_empty());
    assert_eq!(result.output.payload, json!("hello"));

    let kinds: Vec<EventKind> = bus.history(None).iter().map(|e| e.kind).collect();
    assert_eq!(kinds, [EventKind::PipelineStart, EventKind::PipelineEnd]);
}

#[tokio::test]
async fn two_step_chain_builds_provenance_in_order() {
    let store = Arc::new(ContextStore::in_memory().unwrap());
    let result = pipeline(vec![step("upper"), step("wrap")], store)
        .run(&CancellationToken::new(), input("hello"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.output.payload, json!("[UPPER:hello]"));

    let names: Vec<&str> = result
        .output
        .provenance
        .iter()
        .map(|s| s.command.as_str())
        .collect();
    assert_eq!(names, ["upper", "wrap"]);
}

#[tokio::test]
async fn provenance_grows_by_one_per_successful_step() {
    let store = Arc::new(ContextStore::in_memory().unwrap());
    let mut start = input("hello");
    start.append_step(agentrun_core::envelope::ProvenanceStep {
        command: "pre-existing".to_string(),
        args: Vec::new(),
        timestamp: chrono::Utc::now(),
        duration_ms: 1,
        status: agentrun_core::envelope::StepStatus::Ok,
    });

    let result = pipeline(vec![step("upper"), step("wrap")], store)
        .run(&CancellationToken::new(), start.clone())
        .await
        .unwrap();

    assert_eq!(
        result.output.provenance.len(),
        start.provenance.len() + 2
    );
    let names: Vec<&str> = result
        .output
        .provenance
        .iter()
        .map(|s| s.command.as_str())
        .collect();
    assert_eq!(names, ["pre-existing", "upper", "wrap"]);
}

#[tokio::test]
async fn on_error_skip_carries_previous_envelope() {
    let store = Arc::new(ContextStore::in_memory().unwrap());
    let mut failing = step("fail");
    failing.on_error = OnError::Skip;

    let result = pipeline(vec![failing, step("after")], store)
        .run(&CancellationToken::new(), input("initial"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.output.payload, json!("reached"));
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].status, StepOutcome::Skipped);
    assert_eq!(result.steps[1].status, StepOutcome::Ok);
}

#[tokio::test]
async fn on_error_stop_fails_the_pipeline() {
    let store = Arc::new(ContextStore::in_memory().unwrap());
    let bus = Arc::new(MemoryBus::new());

    let result = pipeline(vec![step("fail"), step("after")], store)
        .with_events(Arc::clone(&bus) as _)
        .run(&CancellationToken::new(), input("initial"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].status, StepOutcome::Error);
    assert!(result.error.as_deref().unwrap().contains("step 0"));
    // The failure keeps the last good envelope as output.
    assert_eq!(result.output.payload, json!("initial"));

    let last = bus.history(None).last().cloned().unwrap();
    assert_eq!(last.kind, EventKind::PipelineEnd);
    assert_eq!(last.data["success"], json!(false));
}

#[tokio::test]
async fn verification_failure_stops_with_verify_failed_status() {
    let store = Arc::new(ContextStore::in_memory().unwrap());

    let mut verifier = IntentVerifier::new(Engine::new());
    verifier.set_intent(
        0,
        Intent {
            description: "step 0 must mention goodbye".to_string(),
            assertions: vec![Assertion {
                kind: "contains".to_string(),
                target: String::new(),
                expected: json!("goodbye"),
                message: String::new(),
            }],
        },
    );

    let result = pipeline(vec![step("upper"), step("wrap")], store)
        .with_verifier(Arc::new(verifier))
        .run(&CancellationToken::new(), input("hello"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].status, StepOutcome::VerifyFailed);
    assert_eq!(result.steps[0].verify_passed, Some(false));
}

#[tokio::test]
async fn verification_pass_is_recorded_on_the_step() {
    let store = Arc::new(ContextStore::in_memory().unwrap());

    let mut verifier = IntentVerifier::new(Engine::new());
    verifier.set_intent(
        0,
        Intent {
            description: String::new(),
            assertions: vec![Assertion {
                kind: "contains".to_string(),
                target: String::new(),
                expected: json!("UPPER"),
                message: String::new(),
            }],
        },
    );

    let result = pipeline(vec![step("upper")], store)
        .with_verifier(Arc::new(verifier))
        .run(&CancellationToken::new(), input("hello"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.steps[0].verify_passed, Some(true));
    assert_eq!(result.steps[0].verify_message.as_deref(), Some("passed"));
}

/// Checkpointer that records requested names instead of touching disk.
#[derive(Default)]
struct RecordingCheckpointer {
    saves: Mutex<Vec<String>>,
}

impl Checkpointer for RecordingCheckpointer {
    fn save(&self, name: &str) -> Result<(), CheckpointError> {
        self.saves.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn checkpoint_before_write_step() {
    let store = Arc::new(ContextStore::in_memory().unwrap());
    let checkpointer = Arc::new(RecordingCheckpointer::default());

    let mut write = step("write");
    write.checkpoint_before = true;

    let result = pipeline(vec![step("read"), write], store)
        .with_checkpointer(Arc::clone(&checkpointer) as _)
        .run(&CancellationToken::new(), input(""))
        .await
        .unwrap();

    assert!(result.success);
    let saves = checkpointer.saves.lock().unwrap();
    assert_eq!(*saves, ["step-1-write"]);
    assert_eq!(result.steps[0].checkpoint_saved, None);
    assert_eq!(
        result.steps[1].checkpoint_saved.as_deref(),
        Some("step-1-write")
    );
}

/// A failing checkpointer is observable via events but never fatal.
struct FailingCheckpointer;

impl Checkpointer for FailingCheckpointer {
    fn save(&self, _name: &str) -> Result<(), CheckpointError> {
        Err(CheckpointError::Io(std::io::Error::other("disk full")))
    }
}

#[tokio::test]
async fn checkpoint_failure_is_nonfatal() {
    let store = Arc::new(ContextStore::in_memory().unwrap());
    let bus = Arc::new(MemoryBus::new());

    let mut write = step("write");
    write.checkpoint_before = true;

    let result = pipeline(vec![write], store)
        .with_events(Arc::clone(&bus) as _)
        .with_checkpointer(Arc::new(FailingCheckpointer))
        .run(&CancellationToken::new(), input(""))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.steps[0].checkpoint_saved, None);
    assert!(bus
        .history(None)
        .iter()
        .any(|e| e.kind == EventKind::CheckpointError));
}

/// A verifier and executor working together across a longer run, with per-
/// step durations recorded in provenance.
#[tokio::test]
async fn durations_are_recorded_for_every_appended_step() {
    let store = Arc::new(ContextStore::in_memory().unwrap());
    let result = pipeline(vec![step("upper"), step("wrap"), step("after")], store)
        .run(&CancellationToken::new(), input("x"))
        .await
        .unwrap();

    assert_eq!(result.output.provenance.len(), 3);
    for appended in &result.output.provenance {
        // Durations are wall-clock measurements; zero is possible for fast
        // steps but the field must always be present and sane.
        assert!(appended.duration_ms < 60_000);
    }
}

/// Custom verifier trait object, exercised without the IntentVerifier
/// convenience type.
struct AlwaysFailsAtIndex(usize);

impl StepVerifier for AlwaysFailsAtIndex {
    fn verify_step(
        &self,
        index: usize,
        _output: &Envelope,
    ) -> Option<agentrun_core::verify::VerificationResult> {
        (index == self.0).then(|| agentrun_core::verify::VerificationResult {
            passed: false,
            results: vec![AssertionResult {
                assertion: Assertion {
                    kind: "contains".to_string(),
                    target: String::new(),
                    expected: Value::Null,
                    message: String::new(),
                },
                passed: false,
                actual: Value::Null,
                message: "synthetic failure".to_string(),
            }],
            timestamp: chrono::Utc::now(),
        })
    }
}

#[tokio::test]
async fn verify_failed_skip_policy_rejects_output_and_continues() {
    let store = Arc::new(ContextStore::in_memory().unwrap());

    let mut first = step("upper");
    first.on_error = OnError::Skip;

    let result = pipeline(vec![first, step("wrap")], store)
        .with_verifier(Arc::new(AlwaysFailsAtIndex(0)))
        .run(&CancellationToken::new(), input("hello"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.steps[0].status, StepOutcome::VerifyFailed);
    // Step 1 wrapped the original input, not the rejected output of step 0.
    assert_eq!(result.output.payload, json!("[hello]"));
}

/// Store contents written by one step are visible to later steps.
struct StoreAwareExecutor;

#[async_trait]
impl CommandExecutor for StoreAwareExecutor {
    async fn execute(
        &self,
        _cancel: &CancellationToken,
        name: &str,
        _input: Envelope,
        store: &ContextStore,
    ) -> Result<Envelope, CommandError> {
        use agentrun_core::store::Scope;
        match name {
            "produce" => {
                store.set(Scope::Session, "found", json!(["a", "b"]))?;
                Ok(Envelope::new(json!("produced"), "text/plain", name))
            }
            "consume" => {
                let found = store.get(Scope::Session, "found")?;
                let count = found.as_array().map(|a| a.len()).unwrap_or(0);
                Ok(Envelope::new(json!(count), "application/json", name))
            }
            other => Err(CommandError::Failed(format!("unknown command {other}"))),
        }
    }
}

#[tokio::test]
async fn store_is_a_side_channel_between_steps() {
    let store = Arc::new(ContextStore::in_memory().unwrap());
    let mut counts: HashMap<String, usize> = HashMap::new();

    let result = Pipeline::new(
        vec![step("produce"), step("consume")],
        Arc::clone(&store),
    )
    .with_executor(Arc::new(StoreAwareExecutor))
    .run(&CancellationToken::new(), input(""))
    .await
    .unwrap();

    assert!(result.success);
    assert_eq!(result.output.payload, json!(2));
    for s in &result.steps {
        *counts.entry(s.step.command.clone()).or_default() += 1;
    }
    assert_eq!(counts.len(), 2);
}
