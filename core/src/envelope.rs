//! The envelope data-flow model.
//!
//! Every value passed between pipeline steps is wrapped in an [`Envelope`]
//! carrying the payload alongside metadata and a provenance chain. Envelopes
//! are value-semantic: a command receives one and produces one, and the chain
//! records the observed chronological order of the steps that shaped it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a single provenance step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Error,
    Skipped,
}

/// One operation in the provenance chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceStep {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: StepStatus,
}

/// Information about the envelope's content and origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub content_type: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub source: String,
}

/// The universal value type flowing between steps.
///
/// Binary payloads are represented as JSON strings by their producers; the
/// payload itself is always a JSON value so that envelopes round-trip through
/// the context store and the wire protocol without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub payload: Value,
    pub meta: Metadata,
    #[serde(default)]
    pub provenance: Vec<ProvenanceStep>,
}

impl Envelope {
    /// Create an envelope with the given payload, content type, and source.
    /// Metadata is stamped with the current time; the provenance is empty.
    pub fn new(payload: Value, content_type: &str, source: &str) -> Self {
        Self {
            payload,
            meta: Metadata {
                content_type: content_type.to_string(),
                tags: BTreeMap::new(),
                created_at: Utc::now(),
                source: source.to_string(),
            },
            provenance: Vec::new(),
        }
    }

    /// Append a provenance step, extending the chain in order.
    pub fn append_step(&mut self, step: ProvenanceStep) {
        self.provenance.push(step);
    }

    /// Render the payload as a string.
    ///
    /// String payloads are returned verbatim; everything else (including a
    /// missing payload, which renders as `null`) is the canonical JSON
    /// serialization.
    pub fn payload_as_string(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}
