//! Spec validation. All failures accumulate; the spec is valid iff the
//! issue list is empty.

use serde::{Deserialize, Serialize};

use super::loader::API_VERSION;
use super::model::{ProjectSpec, SPEC_KIND};
use crate::verify::is_known_assertion_type;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All validation failures for a spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            return Ok(());
        }
        let joined = self
            .issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "validation failed: {joined}")
    }
}

/// Check a spec for required fields and structural correctness.
pub fn validate_spec(spec: &ProjectSpec) -> ValidationResult {
    let mut result = ValidationResult::default();

    if spec.api_version.is_empty() {
        result.push("apiVersion", "required");
    } else if spec.api_version != API_VERSION {
        result.push(
            "apiVersion",
            format!(
                "unsupported version {:?} (expected {API_VERSION})",
                spec.api_version
            ),
        );
    }

    if spec.kind.is_empty() {
        result.push("kind", "required");
    } else if spec.kind != SPEC_KIND {
        result.push(
            "kind",
            format!("unsupported kind {:?} (expected {SPEC_KIND})", spec.kind),
        );
    }

    if spec.meta.name.is_empty() {
        result.push("meta.name", "required");
    }

    if spec.goal.trim().is_empty() {
        result.push("goal", "required");
    }

    for (i, pattern) in spec.allowed_commands.iter().enumerate() {
        if let Err(message) = validate_command_pattern(pattern) {
            result.push(format!("allowed_commands[{i}]"), message);
        }
    }

    for (i, assertion) in spec.success_criteria.iter().enumerate() {
        if assertion.kind.is_empty() {
            result.push(format!("success_criteria[{i}].type"), "required");
        } else if !is_known_assertion_type(&assertion.kind) {
            result.push(
                format!("success_criteria[{i}].type"),
                format!("unknown assertion type {:?}", assertion.kind),
            );
        }
    }

    let mut seen = std::collections::HashSet::new();
    for (i, param) in spec.params.iter().enumerate() {
        if param.name.is_empty() {
            result.push(format!("params[{i}].name"), "required");
        } else if !seen.insert(param.name.as_str()) {
            result.push(
                format!("params[{i}].name"),
                format!("duplicate param name {:?}", param.name),
            );
        }
    }

    result
}

/// A command pattern is `*`, `namespace:*`, or a literal `namespace:...`
/// name with a nonempty namespace.
fn validate_command_pattern(pattern: &str) -> Result<(), String> {
    if pattern.is_empty() {
        return Err("empty command pattern".to_string());
    }
    if pattern == "*" {
        return Ok(());
    }
    match pattern.split_once(':') {
        None => Err(format!(
            "invalid pattern {pattern:?} (expected namespace:command format)"
        )),
        Some(("", _)) => Err(format!("invalid pattern {pattern:?} (empty namespace)")),
        Some(_) => Ok(()),
    }
}
