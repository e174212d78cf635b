//! Event types emitted by the runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of event emitted by the runtime. The set is closed; free-form
/// information travels in the event data instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "command.start")]
    CommandStart,
    #[serde(rename = "command.end")]
    CommandEnd,
    #[serde(rename = "command.error")]
    CommandError,
    #[serde(rename = "pipeline.start")]
    PipelineStart,
    #[serde(rename = "pipeline.end")]
    PipelineEnd,
    #[serde(rename = "pipeline.step")]
    PipelineStep,
    #[serde(rename = "verify.start")]
    VerifyStart,
    #[serde(rename = "verify.result")]
    VerifyResult,
    #[serde(rename = "checkpoint.save")]
    CheckpointSave,
    #[serde(rename = "checkpoint.restore")]
    CheckpointRestore,
    #[serde(rename = "checkpoint.error")]
    CheckpointError,
    #[serde(rename = "context.change")]
    ContextChange,
    #[serde(rename = "plan.generated")]
    PlanGenerated,
    #[serde(rename = "plan.approval_requested")]
    PlanApprovalRequested,
    #[serde(rename = "plan.approved")]
    PlanApproved,
    #[serde(rename = "plan.rejected")]
    PlanRejected,
    #[serde(rename = "spec.loaded")]
    SpecLoaded,
    #[serde(rename = "agent.message")]
    AgentMessage,
}

impl EventKind {
    /// Wire name of the event kind, as it appears in serialized events.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CommandStart => "command.start",
            EventKind::CommandEnd => "command.end",
            EventKind::CommandError => "command.error",
            EventKind::PipelineStart => "pipeline.start",
            EventKind::PipelineEnd => "pipeline.end",
            EventKind::PipelineStep => "pipeline.step",
            EventKind::VerifyStart => "verify.start",
            EventKind::VerifyResult => "verify.result",
            EventKind::CheckpointSave => "checkpoint.save",
            EventKind::CheckpointRestore => "checkpoint.restore",
            EventKind::CheckpointError => "checkpoint.error",
            EventKind::ContextChange => "context.change",
            EventKind::PlanGenerated => "plan.generated",
            EventKind::PlanApprovalRequested => "plan.approval_requested",
            EventKind::PlanApproved => "plan.approved",
            EventKind::PlanRejected => "plan.rejected",
            EventKind::SpecLoaded => "spec.loaded",
            EventKind::AgentMessage => "agent.message",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// A single runtime event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Stamped at publish time when left at the epoch default.
    #[serde(default = "unix_epoch")]
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Event {
    /// Create an event with the current timestamp.
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            data,
            step_index: None,
            duration_ms: None,
        }
    }

    pub(crate) fn is_unstamped(&self) -> bool {
        self.timestamp == DateTime::<Utc>::UNIX_EPOCH
    }
}
