//! The pipeline runner: a sequential scheduler wiring envelope flow,
//! verification, checkpointing, and events.
//!
//! Deterministic ordering is worth more than intra-pipeline parallelism
//! here: steps run strictly in order, and observable store effects precede
//! the step's `command.end` event.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::Checkpointer;
use crate::command::CommandError;
use crate::envelope::{Envelope, ProvenanceStep, StepStatus};
use crate::events::{EventKind, EventPublisher};
use crate::registry::Registry;
use crate::spec::OnError;
use crate::store::{ContextStore, Scope};
use crate::verify::StepVerifier;

/// A single step within a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub intent: String,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub checkpoint_before: bool,
}

impl PipelineStep {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            args: Vec::new(),
            intent: String::new(),
            on_error: OnError::Stop,
            checkpoint_before: false,
        }
    }
}

/// Outcome of a single executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Ok,
    Error,
    Skipped,
    VerifyFailed,
}

/// Record of one pipeline step's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: PipelineStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Envelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub status: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_saved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_message: Option<String>,
}

/// Outcome of a pipeline execution. On failure, `steps` holds everything
/// recorded up to and including the failing step and `output` is the last
/// successful envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub steps: Vec<StepResult>,
    pub success: bool,
    pub output: Envelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline: no executor configured")]
    NoExecutor,
}

/// Resolves a command name and runs it. The pipeline only talks to commands
/// through this interface.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        name: &str,
        input: Envelope,
        store: &ContextStore,
    ) -> Result<Envelope, CommandError>;
}

/// The standard executor: resolve against a [`Registry`] and run.
pub struct RegistryExecutor {
    registry: Arc<Registry>,
}

impl RegistryExecutor {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl CommandExecutor for RegistryExecutor {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        name: &str,
        input: Envelope,
        store: &ContextStore,
    ) -> Result<Envelope, CommandError> {
        let command = self.registry.resolve(name)?;
        command.execute(cancel, input, store).await
    }
}

/// A sequence of commands executed in order, passing envelopes between
/// steps.
pub struct Pipeline {
    steps: Vec<PipelineStep>,
    store: Arc<ContextStore>,
    executor: Option<Arc<dyn CommandExecutor>>,
    events: Option<Arc<dyn EventPublisher>>,
    verifier: Option<Arc<dyn StepVerifier>>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl Pipeline {
    pub fn new(steps: Vec<PipelineStep>, store: Arc<ContextStore>) -> Self {
        Self {
            steps,
            store,
            executor: None,
            events: None,
            verifier: None,
            checkpointer: None,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn StepVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    fn publish(
        &self,
        kind: EventKind,
        data: Value,
        step_index: Option<usize>,
        duration: Option<Duration>,
    ) {
        if let Some(events) = &self.events {
            events.publish_event(kind, data, step_index, duration);
        }
    }

    /// Execute the pipeline. An empty pipeline passes the input through
    /// unchanged; cancellation surfaces as a step error subject to the
    /// step's `on_error` policy.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        input: Envelope,
    ) -> Result<PipelineResult, PipelineError> {
        let executor = self.executor.as_ref().ok_or(PipelineError::NoExecutor)?;

        let mut result = PipelineResult {
            steps: Vec::with_capacity(self.steps.len()),
            success: true,
            output: input.clone(),
            error: None,
        };
        let mut current = input;

        self.publish(
            EventKind::PipelineStart,
            json!({ "step_count": self.steps.len() }),
            None,
            None,
        );

        for (i, step) in self.steps.iter().enumerate() {
            // Checkpoint-before is best-effort: a failed save is observable
            // via the bus but never aborts the pipeline.
            let mut checkpoint_saved = None;
            if step.checkpoint_before
                && let Some(checkpointer) = &self.checkpointer
            {
                let name = format!("step-{i}-{}", step.command);
                match checkpointer.save(&name) {
                    Ok(()) => checkpoint_saved = Some(name),
                    Err(err) => {
                        tracing::warn!(step = i, command = %step.command, error = %err, "checkpoint save failed");
                        self.publish(
                            EventKind::CheckpointError,
                            json!({ "name": name, "error": err.to_string() }),
                            Some(i),
                            None,
                        );
                    }
                }
            }

            self.populate_step_scope(i, step);

            self.publish(
                EventKind::CommandStart,
                json!({
                    "command": step.command,
                    "args": step.args,
                    "intent": step.intent,
                }),
                Some(i),
                None,
            );

            let started_at = Utc::now();
            let clock = std::time::Instant::now();
            let execution = executor.execute(cancel, &step.command, current.clone(), &self.store);
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(CommandError::Cancelled),
                outcome = execution => outcome,
            };
            let duration = clock.elapsed();

            let mut output = match outcome {
                Ok(output) => output,
                Err(err) => {
                    self.publish(
                        EventKind::CommandError,
                        json!({ "command": step.command, "error": err.to_string() }),
                        Some(i),
                        Some(duration),
                    );

                    let record = StepResult {
                        step: step.clone(),
                        output: None,
                        error: Some(err.to_string()),
                        duration_ms: duration.as_millis() as u64,
                        status: StepOutcome::Error,
                        checkpoint_saved,
                        verify_passed: None,
                        verify_message: None,
                    };

                    match step.on_error {
                        OnError::Skip => {
                            // Carry the previous envelope forward unchanged.
                            result.steps.push(StepResult {
                                status: StepOutcome::Skipped,
                                ..record
                            });
                            continue;
                        }
                        OnError::Stop | OnError::Unknown => {
                            result.steps.push(record);
                            return Ok(self.fail(result, current, i, err.to_string()));
                        }
                    }
                }
            };

            // Commands usually return a fresh envelope; the chain survives
            // unless the command propagated provenance itself.
            if output.provenance.is_empty() && !current.provenance.is_empty() {
                output.provenance = current.provenance.clone();
            }
            output.append_step(ProvenanceStep {
                command: step.command.clone(),
                args: step.args.clone(),
                timestamp: started_at,
                duration_ms: duration.as_millis() as u64,
                status: StepStatus::Ok,
            });

            let mut verify_passed = None;
            let mut verify_message = None;
            if let Some(verifier) = &self.verifier
                && let Some(verification) = verifier.verify_step(i, &output)
            {
                self.publish(
                    EventKind::VerifyResult,
                    json!({ "command": step.command, "passed": verification.passed }),
                    Some(i),
                    None,
                );
                verify_passed = Some(verification.passed);

                if !verification.passed {
                    let summary = verification.failure_summary();
                    verify_message = Some(summary.clone());
                    let record = StepResult {
                        step: step.clone(),
                        output: Some(output),
                        error: Some(format!("verification failed: {summary}")),
                        duration_ms: duration.as_millis() as u64,
                        status: StepOutcome::VerifyFailed,
                        checkpoint_saved,
                        verify_passed,
                        verify_message,
                    };

                    match step.on_error {
                        OnError::Skip => {
                            // The output is rejected; the previous envelope
                            // flows on.
                            result.steps.push(record);
                            continue;
                        }
                        OnError::Stop | OnError::Unknown => {
                            result.steps.push(record);
                            return Ok(self.fail(
                                result,
                                current,
                                i,
                                format!("verification failed: {summary}"),
                            ));
                        }
                    }
                }
                verify_message = Some("passed".to_string());
            }

            result.steps.push(StepResult {
                step: step.clone(),
                output: Some(output.clone()),
                error: None,
                duration_ms: duration.as_millis() as u64,
                status: StepOutcome::Ok,
                checkpoint_saved,
                verify_passed,
                verify_message,
            });

            self.publish(
                EventKind::CommandEnd,
                json!({ "command": step.command, "status": "ok" }),
                Some(i),
                Some(duration),
            );

            current = output;
        }

        result.output = current;

        self.publish(
            EventKind::PipelineEnd,
            json!({ "success": true, "step_count": self.steps.len() }),
            None,
            None,
        );

        Ok(result)
    }

    fn populate_step_scope(&self, index: usize, step: &PipelineStep) {
        let entries = [
            ("command", json!(step.command)),
            ("index", json!(index)),
        ];
        for (key, value) in entries {
            if let Err(err) = self.store.set(Scope::Step, key, value) {
                tracing::warn!(step = index, key, error = %err, "step scope update failed");
            }
        }
        if !step.intent.is_empty()
            && let Err(err) = self.store.set(Scope::Step, "intent", json!(step.intent))
        {
            tracing::warn!(step = index, error = %err, "step scope update failed");
        }
    }

    fn fail(
        &self,
        mut result: PipelineResult,
        current: Envelope,
        step_index: usize,
        error: String,
    ) -> PipelineResult {
        self.publish(
            EventKind::PipelineEnd,
            json!({ "success": false, "error": error, "step": step_index }),
            Some(step_index),
            None,
        );
        result.success = false;
        result.error = Some(format!(
            "pipeline stopped at step {step_index} ({}): {error}",
            result
                .steps
                .last()
                .map(|s| s.step.command.as_str())
                .unwrap_or("?")
        ));
        result.output = current;
        result
    }
}
