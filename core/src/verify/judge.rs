//! The optional external qualitative checker behind `llm_judge`.
//!
//! Both slots are initialization-time configuration: the endpoint comes from
//! the runtime config, and an integration registers the judge callback that
//! actually talks to it. The engine itself never speaks HTTP.

use std::sync::{LazyLock, RwLock};

use serde_json::Value;

use super::types::{Assertion, AssertionResult};
use crate::envelope::Envelope;

/// A judge callback: given the envelope, the assertion, and the configured
/// endpoint, produce a verdict.
pub type JudgeFn = fn(&Envelope, &Assertion, &str) -> AssertionResult;

static JUDGE_ENDPOINT: LazyLock<RwLock<Option<String>>> = LazyLock::new(|| RwLock::new(None));
static JUDGE: LazyLock<RwLock<Option<JudgeFn>>> = LazyLock::new(|| RwLock::new(None));

/// Configure (or clear) the judge endpoint.
pub fn set_judge_endpoint(endpoint: Option<String>) {
    *JUDGE_ENDPOINT.write().expect("judge endpoint poisoned") =
        endpoint.filter(|e| !e.is_empty());
}

/// The currently configured judge endpoint, if any.
pub fn judge_endpoint() -> Option<String> {
    JUDGE_ENDPOINT
        .read()
        .expect("judge endpoint poisoned")
        .clone()
}

/// Register the callback invoked for `llm_judge` assertions when an endpoint
/// is configured.
pub fn register_judge(judge: JudgeFn) {
    *JUDGE.write().expect("judge slot poisoned") = Some(judge);
}

/// Checker for the `llm_judge` assertion type. With no endpoint configured
/// the assertion passes with a skip message; with an endpoint the registered
/// judge decides, and a missing judge is a failure rather than a silent pass.
pub(super) fn check_llm_judge(envelope: &Envelope, assertion: &Assertion) -> AssertionResult {
    let Some(endpoint) = judge_endpoint() else {
        return AssertionResult {
            assertion: assertion.clone(),
            passed: true,
            actual: Value::Null,
            message: "llm_judge: skipped (no endpoint configured)".to_string(),
        };
    };

    let judge = *JUDGE.read().expect("judge slot poisoned");
    match judge {
        Some(judge) => judge(envelope, assertion, &endpoint),
        None => AssertionResult {
            assertion: assertion.clone(),
            passed: false,
            actual: Value::Null,
            message: format!("llm_judge: endpoint {endpoint:?} configured but no judge registered"),
        },
    }
}
