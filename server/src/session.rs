//! The agent session: project lifecycle state machine and the JSON-RPC
//! method implementations over the core engine.
//!
//! All lifecycle transitions (load → plan → approve/reject → run) are
//! serialized under a single session lock; the pending-plan slot only
//! changes inside it.

use std::path::PathBuf;
use std::sync::Arc;

use agentrun_core::checkpoint::{
    capture_snapshot, restore_snapshot, FileCheckpointManager, StoreCheckpointer,
};
use agentrun_core::envelope::Envelope;
use agentrun_core::events::{Event, EventKind, MemoryBus};
use agentrun_core::pipeline::{
    Pipeline, PipelineStep, RegistryExecutor, StepOutcome,
};
use agentrun_core::registry::RegistryError;
use agentrun_core::spec::{
    generate_plan, load_spec, scaffold_template, validate_spec, CommandLister, ExecutionPlan,
    OnError, ProjectSpec,
};
use agentrun_core::store::Scope;
use agentrun_core::verify::{Assertion, Engine, Intent, IntentVerifier};
use agentrun_core::{CommandError, ContextStore, Registry};
use agentrun_protocol::codes;
use agentrun_protocol::{
    methods, parse_params, AssertionDef, AssertionOutput, CheckpointParams, CommandDetail,
    CommandInfo, CommandsDescribeParams, ContextGetParams, ContextSetParams, ExecuteParams,
    ExecuteResult, Handler, PipelineParams, ProjectApproveParams, ProjectInitParams,
    ProjectLoadParams, ProjectRejectParams, ProvenanceStepInfo, RpcError, SchemaFieldInfo,
    SchemaInfo, VerificationInfo,
};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Mutable lifecycle state, guarded by the session lock.
#[derive(Default)]
struct SessionState {
    loaded_spec: Option<ProjectSpec>,
    pending_plan: Option<ExecutionPlan>,
    plan_id: String,
}

/// A running agent session over shared core components.
pub struct AgentSession {
    registry: Arc<Registry>,
    store: Arc<ContextStore>,
    bus: Arc<MemoryBus>,
    checkpoints: Arc<FileCheckpointManager>,
    engine: Engine,
    workdir: Option<PathBuf>,
    cancel: CancellationToken,
    state: Mutex<SessionState>,
}

impl AgentSession {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<ContextStore>,
        bus: Arc<MemoryBus>,
        checkpoints: Arc<FileCheckpointManager>,
    ) -> Self {
        Self {
            registry,
            store,
            bus,
            checkpoints,
            engine: Engine::new(),
            workdir: None,
            cancel: CancellationToken::new(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Use a configured verification engine (fail-fast toggle).
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    /// Attach a working directory whose digest is captured in checkpoints.
    pub fn with_workdir(mut self, workdir: PathBuf) -> Self {
        self.workdir = Some(workdir);
        self
    }

    /// The session's root cancellation token. Cancelling it aborts whatever
    /// command or plan is currently executing.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn bus(&self) -> &Arc<MemoryBus> {
        &self.bus
    }

    fn checkpointer(&self) -> Arc<StoreCheckpointer> {
        Arc::new(StoreCheckpointer::new(
            Arc::clone(&self.checkpoints),
            Arc::clone(&self.store),
            self.workdir.clone(),
        ))
    }

    // ── Command methods ──────────────────────────────────────────────────

    async fn commands_list(&self) -> Result<Value, RpcError> {
        let infos: Vec<CommandInfo> = self
            .registry
            .list(None)
            .iter()
            .map(|cmd| CommandInfo {
                name: cmd.name().to_string(),
                description: cmd.description().to_string(),
                namespace: cmd.namespace().to_string(),
            })
            .collect();
        to_value(&infos)
    }

    async fn commands_describe(&self, params: CommandsDescribeParams) -> Result<Value, RpcError> {
        let cmd = self
            .registry
            .resolve(&params.name)
            .map_err(|err| RpcError::new(codes::COMMAND_NOT_FOUND, err.to_string()))?;

        let detail = CommandDetail {
            name: cmd.name().to_string(),
            description: cmd.description().to_string(),
            namespace: cmd.namespace().to_string(),
            input_schema: schema_info(&cmd.input_schema()),
            output_schema: schema_info(&cmd.output_schema()),
            credentials: cmd.required_credentials(),
        };
        to_value(&detail)
    }

    async fn execute(&self, params: ExecuteParams) -> Result<Value, RpcError> {
        let cmd = self
            .registry
            .resolve(&params.command)
            .map_err(|err| RpcError::new(codes::COMMAND_NOT_FOUND, err.to_string()))?;

        let input = Envelope::new(
            params.args.unwrap_or(Value::Null),
            "application/json",
            "agent",
        );

        self.bus.publish(Event::new(
            EventKind::CommandStart,
            json!({ "command": params.command, "intent": params.intent }),
        ));

        let clock = std::time::Instant::now();
        let cancel = self.cancel.child_token();
        let outcome = cmd.execute(&cancel, input, &self.store).await;
        let duration = clock.elapsed();

        let output = match outcome {
            Ok(output) => output,
            Err(err) => {
                let mut event = Event::new(
                    EventKind::CommandError,
                    json!({ "command": params.command, "error": err.to_string() }),
                );
                event.duration_ms = Some(duration.as_millis() as u64);
                self.bus.publish(event);
                return Err(RpcError::new(command_error_code(&err), err.to_string()));
            }
        };

        let mut event = Event::new(
            EventKind::CommandEnd,
            json!({ "command": params.command, "status": "ok" }),
        );
        event.duration_ms = Some(duration.as_millis() as u64);
        self.bus.publish(event);

        let mut result = ExecuteResult {
            payload: output.payload.clone(),
            meta: Some(json!({
                "content_type": output.meta.content_type,
                "source": output.meta.source,
                "tags": output.meta.tags,
            })),
            verification: None,
            provenance: provenance_info(&output),
        };

        if !params.verify.is_empty() {
            let intent = defs_to_intent(&params.verify, &params.intent);
            self.bus.publish(Event::new(
                EventKind::VerifyStart,
                json!({ "command": params.command, "assertions": intent.assertions.len() }),
            ));
            let verification = self.engine.verify(&output, &intent);
            self.bus.publish(Event::new(
                EventKind::VerifyResult,
                json!({ "command": params.command, "passed": verification.passed }),
            ));
            result.verification = Some(verification_info(&verification));
        }

        to_value(&result)
    }

    async fn pipeline(&self, params: PipelineParams) -> Result<Value, RpcError> {
        let mut verifier = IntentVerifier::new(self.engine);
        let mut steps = Vec::with_capacity(params.steps.len());
        for (i, def) in params.steps.iter().enumerate() {
            verifier.set_intent(i, defs_to_intent(&def.verify, &def.intent));
            steps.push(PipelineStep {
                command: def.command.clone(),
                args: def.args.clone(),
                intent: def.intent.clone(),
                on_error: on_error_from_str(&def.on_error),
                checkpoint_before: false,
            });
        }

        let mut pipeline = Pipeline::new(steps, Arc::clone(&self.store))
            .with_executor(Arc::new(RegistryExecutor::new(Arc::clone(&self.registry))))
            .with_events(Arc::clone(&self.bus) as _)
            .with_checkpointer(self.checkpointer());
        if !verifier.is_empty() {
            pipeline = pipeline.with_verifier(Arc::new(verifier));
        }

        let input = Envelope::new(Value::Null, "text/plain", "agent");
        let result = pipeline
            .run(&self.cancel.child_token(), input)
            .await
            .map_err(|err| RpcError::internal(err.to_string()))?;

        let mut response = json!({
            "success": result.success,
            "steps": result.steps.len(),
            "output": result.output.payload,
        });
        if let Some(error) = &result.error {
            response["error"] = json!(error);
        }
        Ok(response)
    }

    // ── Context and checkpoint methods ───────────────────────────────────

    async fn context_get(&self, params: ContextGetParams) -> Result<Value, RpcError> {
        let scope: Scope = params
            .scope
            .parse()
            .map_err(|err: agentrun_core::StoreError| RpcError::invalid_params(err.to_string()))?;
        self.store
            .get(scope, &params.key)
            .map_err(|err| RpcError::internal(err.to_string()))
    }

    async fn context_set(&self, params: ContextSetParams) -> Result<Value, RpcError> {
        let scope: Scope = params
            .scope
            .parse()
            .map_err(|err: agentrun_core::StoreError| RpcError::invalid_params(err.to_string()))?;
        self.store
            .set(scope, &params.key, params.value)
            .map_err(|err| RpcError::internal(err.to_string()))?;

        self.bus.publish(Event::new(
            EventKind::ContextChange,
            json!({ "scope": params.scope, "key": params.key }),
        ));

        Ok(json!("ok"))
    }

    async fn checkpoint_save(&self, params: CheckpointParams) -> Result<Value, RpcError> {
        if params.name.is_empty() {
            return Err(RpcError::invalid_params("checkpoint name is required"));
        }
        let snapshot = capture_snapshot(&self.store, self.workdir.as_deref())
            .map_err(|err| RpcError::internal(err.to_string()))?;
        self.checkpoints
            .save(&params.name, &snapshot)
            .map_err(|err| RpcError::internal(err.to_string()))?;

        self.bus.publish(Event::new(
            EventKind::CheckpointSave,
            json!({ "name": params.name }),
        ));

        Ok(json!({ "saved": params.name }))
    }

    async fn checkpoint_restore(&self, params: CheckpointParams) -> Result<Value, RpcError> {
        let snapshot = self
            .checkpoints
            .restore(&params.name)
            .map_err(|err| RpcError::internal(err.to_string()))?;
        restore_snapshot(&self.store, &snapshot)
            .map_err(|err| RpcError::internal(err.to_string()))?;

        self.bus.publish(Event::new(
            EventKind::CheckpointRestore,
            json!({ "name": params.name }),
        ));

        Ok(json!({ "restored": params.name }))
    }

    async fn history(&self) -> Result<Value, RpcError> {
        to_value(&self.bus.history(None))
    }

    // ── Project lifecycle methods ────────────────────────────────────────

    async fn project_load(&self, params: ProjectLoadParams) -> Result<Value, RpcError> {
        let spec = load_spec(std::path::Path::new(&params.path), &params.params)
            .map_err(|err| RpcError::internal(err.to_string()))?;

        let validation = validate_spec(&spec);
        if !validation.is_valid() {
            return Err(RpcError::new(codes::SPEC_INVALID, validation.to_string()));
        }

        let mut state = self.state.lock().await;
        state.loaded_spec = Some(spec.clone());
        state.pending_plan = None;
        state.plan_id.clear();
        drop(state);

        self.bus.publish(Event::new(
            EventKind::SpecLoaded,
            json!({
                "name": spec.meta.name,
                "description": spec.meta.description,
                "goal": spec.goal,
            }),
        ));

        Ok(json!({
            "name": spec.meta.name,
            "description": spec.meta.description,
            "goal": spec.goal,
            "constraints": spec.constraints,
            "success_criteria": spec.success_criteria.len(),
            "params": spec.params,
        }))
    }

    async fn project_plan(&self) -> Result<Value, RpcError> {
        let mut state = self.state.lock().await;

        let Some(spec) = state.loaded_spec.clone() else {
            return Err(RpcError::new(
                codes::NO_PENDING_PLAN,
                "no spec loaded; call project.load first",
            ));
        };

        let plan = generate_plan(&spec, Some(self.registry.as_ref() as &dyn CommandLister))
            .map_err(|err| RpcError::internal(err.to_string()))?;

        let plan_id = format!("plan-{}", Utc::now().timestamp_millis());
        state.pending_plan = Some(plan.clone());
        state.plan_id = plan_id.clone();
        drop(state);

        self.bus.publish(Event::new(
            EventKind::PlanGenerated,
            json!({
                "plan_id": plan_id,
                "spec": plan.spec,
                "steps": plan.steps.len(),
                "risk_summary": plan.risk_summary,
            }),
        ));
        self.bus.publish(Event::new(
            EventKind::PlanApprovalRequested,
            json!({ "plan_id": plan_id, "message": "plan awaiting approval" }),
        ));

        Ok(json!({
            "plan_id": plan_id,
            "spec": plan.spec,
            "steps": to_value(&plan.steps)?,
            "risk_summary": plan.risk_summary,
            "success_criteria": plan.success_criteria.len(),
            "status": "awaiting_approval",
        }))
    }

    async fn project_approve(&self, _params: ProjectApproveParams) -> Result<Value, RpcError> {
        let mut state = self.state.lock().await;

        let Some(plan) = state.pending_plan.take() else {
            return Err(RpcError::new(
                codes::NO_PENDING_PLAN,
                "no pending plan to approve",
            ));
        };
        let plan_id = std::mem::take(&mut state.plan_id);

        self.bus.publish(Event::new(
            EventKind::PlanApproved,
            json!({ "plan_id": plan_id }),
        ));

        // Execution stays inside the session lock: approvals are strictly
        // serialized.
        self.execute_plan(plan).await
    }

    async fn project_reject(&self, params: ProjectRejectParams) -> Result<Value, RpcError> {
        let mut state = self.state.lock().await;

        if state.pending_plan.is_none() {
            return Err(RpcError::new(
                codes::NO_PENDING_PLAN,
                "no pending plan to reject",
            ));
        }

        let plan_id = std::mem::take(&mut state.plan_id);
        state.pending_plan = None;

        self.bus.publish(Event::new(
            EventKind::PlanRejected,
            json!({ "plan_id": plan_id, "feedback": params.feedback }),
        ));

        Ok(json!({ "status": "rejected", "feedback": params.feedback }))
    }

    async fn project_run(&self, params: ProjectLoadParams) -> Result<Value, RpcError> {
        let spec = load_spec(std::path::Path::new(&params.path), &params.params)
            .map_err(|err| RpcError::internal(err.to_string()))?;

        let validation = validate_spec(&spec);
        if !validation.is_valid() {
            return Err(RpcError::new(codes::SPEC_INVALID, validation.to_string()));
        }

        self.bus.publish(Event::new(
            EventKind::SpecLoaded,
            json!({ "name": spec.meta.name }),
        ));

        let plan = generate_plan(&spec, Some(self.registry.as_ref() as &dyn CommandLister))
            .map_err(|err| RpcError::internal(err.to_string()))?;

        self.bus.publish(Event::new(
            EventKind::PlanGenerated,
            json!({ "spec": plan.spec, "steps": plan.steps.len() }),
        ));
        self.bus
            .publish(Event::new(EventKind::PlanApproved, json!({ "auto": true })));

        self.execute_plan(plan).await
    }

    async fn project_validate(&self, params: ProjectLoadParams) -> Result<Value, RpcError> {
        let spec = load_spec(std::path::Path::new(&params.path), &params.params)
            .map_err(|err| RpcError::internal(err.to_string()))?;

        let validation = validate_spec(&spec);
        Ok(json!({
            "valid": validation.is_valid(),
            "errors": to_value(&validation.issues)?,
        }))
    }

    async fn project_init(&self, params: ProjectInitParams) -> Result<Value, RpcError> {
        if params.template.is_empty() {
            return Err(RpcError::invalid_params(format!(
                "template is required (known: {})",
                agentrun_core::spec::template_names().join(", ")
            )));
        }
        let output = if params.output.is_empty() {
            "project.agentrun.yaml".to_string()
        } else {
            params.output
        };

        scaffold_template(&params.template, std::path::Path::new(&output))
            .map_err(|err| RpcError::internal(err.to_string()))?;

        Ok(json!({ "created": output, "template": params.template }))
    }

    /// Run an approved plan through the pipeline and check the spec's
    /// success criteria against the final output.
    async fn execute_plan(&self, plan: ExecutionPlan) -> Result<Value, RpcError> {
        let steps: Vec<PipelineStep> = plan
            .steps
            .iter()
            .map(|step| PipelineStep {
                command: step.command.clone(),
                args: step.args.clone(),
                intent: step.intent.clone(),
                on_error: step.on_error,
                checkpoint_before: step.checkpoint_before,
            })
            .collect();

        let pipeline = Pipeline::new(steps, Arc::clone(&self.store))
            .with_executor(Arc::new(RegistryExecutor::new(Arc::clone(&self.registry))))
            .with_events(Arc::clone(&self.bus) as _)
            .with_checkpointer(self.checkpointer());

        let input = Envelope::new(Value::Null, "text/plain", "agent");
        let result = pipeline
            .run(&self.cancel.child_token(), input)
            .await
            .map_err(|err| RpcError::internal(err.to_string()))?;

        if !result.success {
            let verify_failed = result
                .steps
                .last()
                .is_some_and(|step| step.status == StepOutcome::VerifyFailed);
            let code = if verify_failed {
                codes::VERIFY_FAILED
            } else {
                codes::COMMAND_FAILED
            };
            let message = result
                .error
                .unwrap_or_else(|| "plan execution failed".to_string());
            return Err(RpcError::new(code, message));
        }

        let mut response = json!({
            "success": result.success,
            "steps": result.steps.len(),
            "output": result.output.payload,
        });

        if !plan.success_criteria.is_empty() {
            let intent = Intent {
                description: format!("success criteria of {}", plan.spec),
                assertions: plan.success_criteria.clone(),
            };

            self.bus.publish(Event::new(
                EventKind::VerifyStart,
                json!({ "type": "success_criteria", "assertions": intent.assertions.len() }),
            ));
            let verification = self.engine.verify(&result.output, &intent);
            self.bus.publish(Event::new(
                EventKind::VerifyResult,
                json!({ "passed": verification.passed, "assertions": verification.results.len() }),
            ));

            let passed = verification.results.iter().filter(|r| r.passed).count();
            let total = verification.results.len();
            response["verification"] = to_value(&verification_info(&verification))?;

            if !verification.passed {
                return Err(RpcError::new(
                    codes::VERIFY_FAILED,
                    format!("verification failed: {passed}/{total} assertions passed"),
                ));
            }
        }

        Ok(response)
    }
}

/// Wire every supported method into a protocol handler.
pub fn register_methods(handler: &Handler, session: Arc<AgentSession>) {
    macro_rules! method {
        ($name:expr, $params:ty, $call:ident) => {{
            let session = Arc::clone(&session);
            handler.register($name, move |params| {
                let session = Arc::clone(&session);
                Box::pin(async move {
                    let params: $params = parse_params(params)?;
                    session.$call(params).await
                })
            });
        }};
        ($name:expr, $call:ident) => {{
            let session = Arc::clone(&session);
            handler.register($name, move |_params| {
                let session = Arc::clone(&session);
                Box::pin(async move { session.$call().await })
            });
        }};
    }

    method!(methods::COMMANDS_LIST, commands_list);
    method!(methods::COMMANDS_DESCRIBE, CommandsDescribeParams, commands_describe);
    method!(methods::EXECUTE, ExecuteParams, execute);
    method!(methods::PIPELINE, PipelineParams, pipeline);
    method!(methods::CONTEXT_GET, ContextGetParams, context_get);
    method!(methods::CONTEXT_SET, ContextSetParams, context_set);
    method!(methods::CHECKPOINT_SAVE, CheckpointParams, checkpoint_save);
    method!(methods::CHECKPOINT_RESTORE, CheckpointParams, checkpoint_restore);
    method!(methods::HISTORY, history);
    method!(methods::PROJECT_LOAD, ProjectLoadParams, project_load);
    method!(methods::PROJECT_PLAN, project_plan);
    method!(methods::PROJECT_APPROVE, ProjectApproveParams, project_approve);
    method!(methods::PROJECT_REJECT, ProjectRejectParams, project_reject);
    method!(methods::PROJECT_RUN, ProjectLoadParams, project_run);
    method!(methods::PROJECT_INIT, ProjectInitParams, project_init);
    method!(methods::PROJECT_VALIDATE, ProjectLoadParams, project_validate);
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| RpcError::internal(format!("serialize: {err}")))
}

fn command_error_code(err: &CommandError) -> i64 {
    match err {
        CommandError::Registry(RegistryError::NotFound(_)) => codes::COMMAND_NOT_FOUND,
        _ => codes::COMMAND_FAILED,
    }
}

fn on_error_from_str(raw: &str) -> OnError {
    match raw {
        "" | "stop" => OnError::Stop,
        "skip" => OnError::Skip,
        _ => OnError::Unknown,
    }
}

fn defs_to_intent(defs: &[AssertionDef], description: &str) -> Intent {
    Intent {
        description: description.to_string(),
        assertions: defs
            .iter()
            .map(|def| Assertion {
                kind: def.kind.clone(),
                target: def.target.clone(),
                expected: def.expected.clone(),
                message: String::new(),
            })
            .collect(),
    }
}

fn verification_info(result: &agentrun_core::verify::VerificationResult) -> VerificationInfo {
    VerificationInfo {
        passed: result.passed,
        results: result
            .results
            .iter()
            .map(|r| AssertionOutput {
                kind: r.assertion.kind.clone(),
                passed: r.passed,
                actual: r.actual.clone(),
                message: r.message.clone(),
            })
            .collect(),
    }
}

fn provenance_info(envelope: &Envelope) -> Vec<ProvenanceStepInfo> {
    envelope
        .provenance
        .iter()
        .map(|step| ProvenanceStepInfo {
            command: step.command.clone(),
            duration_ms: Some(step.duration_ms),
            status: match step.status {
                agentrun_core::envelope::StepStatus::Ok => "ok".to_string(),
                agentrun_core::envelope::StepStatus::Error => "error".to_string(),
                agentrun_core::envelope::StepStatus::Skipped => "skipped".to_string(),
            },
        })
        .collect()
}

fn schema_info(schema: &agentrun_core::Schema) -> SchemaInfo {
    SchemaInfo {
        kind: schema.kind.clone(),
        properties: schema
            .properties
            .iter()
            .map(|(name, field)| {
                (
                    name.clone(),
                    SchemaFieldInfo {
                        kind: field.kind.clone(),
                        description: field.description.clone(),
                    },
                )
            })
            .collect(),
        required: schema.required.clone(),
    }
}
