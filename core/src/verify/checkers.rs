//! Built-in assertion checkers and the process-global checker registry.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use regex::Regex;
use serde_json::Value;

use super::judge::check_llm_judge;
use super::types::{Assertion, AssertionResult};
use crate::envelope::Envelope;

/// A function that checks a single assertion against an envelope.
pub type AssertionChecker = fn(&Envelope, &Assertion) -> AssertionResult;

static CHECKERS: LazyLock<RwLock<HashMap<String, AssertionChecker>>> = LazyLock::new(|| {
    let mut checkers: HashMap<String, AssertionChecker> = HashMap::new();
    checkers.insert("not_empty".to_string(), check_not_empty);
    checkers.insert("contains".to_string(), check_contains);
    checkers.insert("not_contains".to_string(), check_not_contains);
    checkers.insert("count_gte".to_string(), check_count_gte);
    checkers.insert("matches_regex".to_string(), check_matches_regex);
    checkers.insert("json_schema".to_string(), check_json_schema);
    checkers.insert("llm_judge".to_string(), check_llm_judge);
    RwLock::new(checkers)
});

/// Add a custom checker. Registration is an initialization-time concern;
/// later registrations overwrite.
pub fn register_checker(name: &str, checker: AssertionChecker) {
    CHECKERS
        .write()
        .expect("checker registry poisoned")
        .insert(name.to_string(), checker);
}

pub(crate) fn lookup_checker(name: &str) -> Option<AssertionChecker> {
    CHECKERS
        .read()
        .expect("checker registry poisoned")
        .get(name)
        .copied()
}

/// Whether an assertion type is registered.
pub fn is_known_assertion_type(name: &str) -> bool {
    CHECKERS
        .read()
        .expect("checker registry poisoned")
        .contains_key(name)
}

/// All registered checker names, sorted.
pub fn checker_names() -> Vec<String> {
    let mut names: Vec<String> = CHECKERS
        .read()
        .expect("checker registry poisoned")
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

/// Extract the value an assertion targets from an envelope.
///
/// `output` (or empty) and `output.lines` select the payload rendering;
/// `meta.content_type`, `meta.source`, and `meta.tags.<key>` select metadata.
/// Anything else falls back to the payload rendering.
pub fn resolve_target(envelope: &Envelope, target: &str) -> String {
    match target {
        "" | "output" | "output.lines" => envelope.payload_as_string(),
        "meta.content_type" => envelope.meta.content_type.clone(),
        "meta.source" => envelope.meta.source.clone(),
        _ => {
            if let Some(key) = target.strip_prefix("meta.tags.") {
                envelope.meta.tags.get(key).cloned().unwrap_or_default()
            } else {
                envelope.payload_as_string()
            }
        }
    }
}

fn result(
    assertion: &Assertion,
    passed: bool,
    actual: Value,
    default_msg: impl FnOnce() -> String,
) -> AssertionResult {
    let message = if !passed && assertion.message.is_empty() {
        default_msg()
    } else {
        assertion.message.clone()
    };
    AssertionResult {
        assertion: assertion.clone(),
        passed,
        actual,
        message,
    }
}

fn check_not_empty(envelope: &Envelope, assertion: &Assertion) -> AssertionResult {
    let value = resolve_target(envelope, &assertion.target);
    let passed =
        !envelope.payload.is_null() && !value.trim().is_empty() && value != "null";
    result(assertion, passed, Value::String(value), || {
        "output is empty".to_string()
    })
}

fn check_contains(envelope: &Envelope, assertion: &Assertion) -> AssertionResult {
    let value = resolve_target(envelope, &assertion.target);
    let expected = expected_string(&assertion.expected);
    let passed = value.contains(&expected);
    result(
        assertion,
        passed,
        Value::String(truncate(&value, 200)),
        || format!("output does not contain {expected:?}"),
    )
}

fn check_not_contains(envelope: &Envelope, assertion: &Assertion) -> AssertionResult {
    let value = resolve_target(envelope, &assertion.target);
    let expected = expected_string(&assertion.expected);
    let passed = !value.contains(&expected);
    result(
        assertion,
        passed,
        Value::String(truncate(&value, 200)),
        || format!("output should not contain {expected:?}"),
    )
}

/// Line-count (or array-length) comparison.
///
/// For `output.lines` the count is the number of `\n`-split lines; array
/// payloads count elements; anything else falls back to the line count of
/// the string rendering, so callers should prefer `output.lines` explicitly.
fn check_count_gte(envelope: &Envelope, assertion: &Assertion) -> AssertionResult {
    let Some(expected) = expected_count(&assertion.expected) else {
        return AssertionResult {
            assertion: assertion.clone(),
            passed: false,
            actual: Value::Null,
            message: format!(
                "count_gte: invalid expected value: {}",
                assertion.expected
            ),
        };
    };

    let actual = if assertion.target == "output.lines" {
        line_count(&resolve_target(envelope, &assertion.target))
    } else if let Some(items) = envelope.payload.as_array() {
        items.len() as i64
    } else {
        line_count(&resolve_target(envelope, &assertion.target))
    };

    let passed = actual >= expected;
    result(assertion, passed, Value::from(actual), || {
        format!("count {actual} is less than expected {expected}")
    })
}

fn check_matches_regex(envelope: &Envelope, assertion: &Assertion) -> AssertionResult {
    let value = resolve_target(envelope, &assertion.target);
    let pattern = expected_string(&assertion.expected);

    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(err) => {
            return AssertionResult {
                assertion: assertion.clone(),
                passed: false,
                actual: Value::Null,
                message: format!("matches_regex: invalid pattern {pattern:?}: {err}"),
            };
        }
    };

    let passed = re.is_match(&value);
    result(
        assertion,
        passed,
        Value::String(truncate(&value, 200)),
        || format!("output does not match regex {pattern:?}"),
    )
}

/// Structural JSON check: the target must parse as JSON, and when the
/// expected value carries a `required` list every listed key must be present
/// at the top level.
fn check_json_schema(envelope: &Envelope, assertion: &Assertion) -> AssertionResult {
    let value = resolve_target(envelope, &assertion.target);

    let parsed: Value = match serde_json::from_str(&value) {
        Ok(parsed) => parsed,
        Err(err) => {
            return AssertionResult {
                assertion: assertion.clone(),
                passed: false,
                actual: Value::String(truncate(&value, 200)),
                message: format!("json_schema: not valid JSON: {err}"),
            };
        }
    };

    let mut missing = None;
    if let Some(required) = assertion
        .expected
        .as_object()
        .and_then(|schema| schema.get("required"))
        .and_then(Value::as_array)
        && let Some(obj) = parsed.as_object()
    {
        missing = required
            .iter()
            .map(expected_string)
            .find(|key| !obj.contains_key(key));
    }
    if let Some(key) = missing {
        return AssertionResult {
            assertion: assertion.clone(),
            passed: false,
            actual: parsed,
            message: format!("json_schema: missing required key {key:?}"),
        };
    }

    let message = if assertion.message.is_empty() {
        "JSON is valid".to_string()
    } else {
        assertion.message.clone()
    };
    AssertionResult {
        assertion: assertion.clone(),
        passed: true,
        actual: parsed,
        message,
    }
}

fn expected_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn expected_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn line_count(text: &str) -> i64 {
    text.split('\n').count() as i64
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
