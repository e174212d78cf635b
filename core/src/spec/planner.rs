//! Spec → ordered execution plan.
//!
//! The plan is a structured preview of what will run, suitable for review
//! before approval. Planning is deterministic: the same spec against the
//! same command universe always yields the same ordered step list.

use serde::{Deserialize, Serialize};

use super::model::{OutputSpec, ProjectSpec};
use super::validator::validate_spec;
use super::SpecError;
use crate::verify::Assertion;

/// The canonical write-to-output command. When a spec declares an output
/// path, this step has the path bound as its sole argument.
pub const OUTPUT_WRITE_COMMAND: &str = "fs:write";

/// Provides the known command names for plan expansion, without a direct
/// dependency on the registry.
pub trait CommandLister {
    fn names(&self) -> Vec<String>;
    fn match_glob(&self, pattern: &str) -> Vec<String>;
}

/// Risk classification of a plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Risk {
    #[serde(rename = "read-only")]
    ReadOnly,
    #[serde(rename = "write")]
    Write,
    /// Reserved for command-declared risk; the verb heuristic never emits it.
    #[serde(rename = "destructive")]
    Destructive,
}

/// Error policy of a plan or pipeline step. Unknown wire values behave like
/// `stop`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    #[default]
    Stop,
    Skip,
    #[serde(other)]
    Unknown,
}

/// A single step in an execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    pub intent: String,
    pub risk: Risk,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub checkpoint_before: bool,
    pub on_error: OnError,
}

/// The concrete plan generated from a validated spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub spec: String,
    pub steps: Vec<PlanStep>,
    pub risk_summary: String,
    pub allowed_commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success_criteria: Vec<Assertion>,
    pub output: OutputSpec,
}

/// Produce an execution plan from a spec. Validation failures surface as
/// [`SpecError::Invalid`].
pub fn generate_plan(
    spec: &ProjectSpec,
    lister: Option<&dyn CommandLister>,
) -> Result<ExecutionPlan, SpecError> {
    let validation = validate_spec(spec);
    if !validation.is_valid() {
        return Err(SpecError::Invalid(validation));
    }

    let available = resolve_allowed_commands(&spec.allowed_commands, lister);
    let (reads, writes) = classify_commands(&available);
    let steps = build_steps(spec, &reads, &writes);
    let risk_summary = format!(
        "{} read-only, {} write operations",
        reads.len(),
        writes.len()
    );

    Ok(ExecutionPlan {
        spec: spec.meta.name.clone(),
        steps,
        risk_summary,
        allowed_commands: available,
        success_criteria: spec.success_criteria.clone(),
        output: spec.output.clone(),
    })
}

/// Expand glob patterns against the lister's known names, de-duplicating
/// while preserving first occurrence. Without a lister the patterns pass
/// through literally.
fn resolve_allowed_commands(
    patterns: &[String],
    lister: Option<&dyn CommandLister>,
) -> Vec<String> {
    let Some(lister) = lister else {
        return patterns.to_vec();
    };

    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for pattern in patterns {
        if pattern.contains('*') {
            for name in lister.match_glob(pattern) {
                if seen.insert(name.clone()) {
                    result.push(name);
                }
            }
        } else if seen.insert(pattern.clone()) {
            result.push(pattern.clone());
        }
    }
    result
}

const WRITE_VERBS: [&str; 7] = [
    "write", "create", "delete", "update", "post", "put", "patch",
];

/// A command is a write operation if its lowered name contains any of the
/// write verbs. Conservative; command-declared risk is a future refinement.
fn is_write_command(name: &str) -> bool {
    let lower = name.to_lowercase();
    WRITE_VERBS.iter().any(|verb| lower.contains(verb))
}

fn classify_commands(commands: &[String]) -> (Vec<String>, Vec<String>) {
    let mut reads = Vec::new();
    let mut writes = Vec::new();
    for command in commands {
        if is_write_command(command) {
            writes.push(command.clone());
        } else {
            reads.push(command.clone());
        }
    }
    (reads, writes)
}

/// Read-only steps first, then write steps with checkpoints; ordering
/// within each class follows input order.
fn build_steps(spec: &ProjectSpec, reads: &[String], writes: &[String]) -> Vec<PlanStep> {
    let mut steps = Vec::with_capacity(reads.len() + writes.len());

    for command in reads {
        steps.push(PlanStep {
            command: command.clone(),
            args: Vec::new(),
            intent: format!("Gather data using {command}"),
            risk: Risk::ReadOnly,
            checkpoint_before: false,
            on_error: OnError::Stop,
        });
    }

    for command in writes {
        let mut step = PlanStep {
            command: command.clone(),
            args: Vec::new(),
            intent: format!("Write output using {command}"),
            risk: Risk::Write,
            checkpoint_before: true,
            on_error: OnError::Stop,
        };
        if command == OUTPUT_WRITE_COMMAND && !spec.output.path.is_empty() {
            step.args = vec![spec.output.path.clone()];
            step.intent = format!("Write final output to {}", spec.output.path);
        }
        steps.push(step);
    }

    steps
}
