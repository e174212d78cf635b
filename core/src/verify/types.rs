//! Assertion and verification result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A machine-checkable claim about an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    /// Checker name: `not_empty`, `contains`, `not_contains`, `count_gte`,
    /// `matches_regex`, `json_schema`, `llm_judge`, or a registered custom
    /// type.
    #[serde(rename = "type")]
    pub kind: String,
    /// What to check: `output` (default), `output.lines`,
    /// `meta.content_type`, `meta.source`, or `meta.tags.<key>`.
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub expected: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// What a command or pipeline step is supposed to achieve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

/// Outcome of a single assertion check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub assertion: Assertion,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub actual: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Outcome of verifying an envelope against an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub results: Vec<AssertionResult>,
    pub timestamp: DateTime<Utc>,
}

impl VerificationResult {
    /// Messages of the failed assertions, joined for display.
    pub fn failure_summary(&self) -> String {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
