//! Parameter and result types for the supported methods.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An assertion attached to an `execute` or `pipeline` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssertionDef {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub expected: Value,
}

/// Parameters for `execute`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteParams {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub intent: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verify: Vec<AssertionDef>,
}

/// One step of a `pipeline` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStepDef {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub intent: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verify: Vec<AssertionDef>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub on_error: String,
}

/// Parameters for `pipeline`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineParams {
    #[serde(default)]
    pub steps: Vec<PipelineStepDef>,
}

/// Parameters for `context.get`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextGetParams {
    pub scope: String,
    pub key: String,
}

/// Parameters for `context.set`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSetParams {
    pub scope: String,
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

/// Parameters for `checkpoint.save` / `checkpoint.restore`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointParams {
    pub name: String,
}

/// Parameters for `project.load`, `project.run`, and `project.validate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectLoadParams {
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// Parameters for `project.approve`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectApproveParams {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plan_id: String,
}

/// Parameters for `project.reject`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectRejectParams {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feedback: String,
}

/// Parameters for `project.init`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectInitParams {
    #[serde(default)]
    pub template: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
}

/// Parameters for `commands.describe`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandsDescribeParams {
    pub name: String,
}

/// One command in a `commands.list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    pub namespace: String,
}

/// A schema field in a `commands.describe` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaFieldInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

/// A simplified schema in a `commands.describe` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaInfo {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaFieldInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// Detailed command description for `commands.describe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDetail {
    pub name: String,
    pub description: String,
    pub namespace: String,
    pub input_schema: SchemaInfo,
    pub output_schema: SchemaInfo,
    #[serde(
        rename = "required_credentials",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub credentials: Vec<String>,
}

/// One provenance entry in an `execute` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceStepInfo {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub status: String,
}

/// One assertion outcome in a verification block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionOutput {
    #[serde(rename = "type")]
    pub kind: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub actual: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Verification block in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationInfo {
    pub passed: bool,
    pub results: Vec<AssertionOutput>,
}

/// Result of `execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provenance: Vec<ProvenanceStepInfo>,
}
