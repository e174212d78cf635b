//! The assertion runner.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;

use super::checkers::lookup_checker;
use super::types::{AssertionResult, Intent, VerificationResult};
use crate::envelope::Envelope;

/// Evaluates intents against envelopes using the global checker registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Engine {
    fail_fast: bool,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop evaluating on the first failed assertion.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Check an envelope against every assertion in the intent. Unknown
    /// assertion types fail with a descriptive message; zero assertions pass
    /// trivially.
    pub fn verify(&self, envelope: &Envelope, intent: &Intent) -> VerificationResult {
        let mut result = VerificationResult {
            passed: true,
            results: Vec::with_capacity(intent.assertions.len()),
            timestamp: Utc::now(),
        };

        for assertion in &intent.assertions {
            let outcome = match lookup_checker(&assertion.kind) {
                Some(checker) => checker(envelope, assertion),
                None => AssertionResult {
                    assertion: assertion.clone(),
                    passed: false,
                    actual: Value::Null,
                    message: format!("unknown assertion type: {:?}", assertion.kind),
                },
            };

            let passed = outcome.passed;
            result.results.push(outcome);
            if !passed {
                result.passed = false;
                if self.fail_fast {
                    break;
                }
            }
        }

        result
    }
}

/// Capability interface the pipeline uses to verify step outputs without
/// depending on how intents were attached.
pub trait StepVerifier: Send + Sync {
    /// Verify the output of step `index`. `None` means the step carries no
    /// intent and passes implicitly.
    fn verify_step(&self, index: usize, output: &Envelope) -> Option<VerificationResult>;
}

/// A [`StepVerifier`] holding one optional intent per step index.
pub struct IntentVerifier {
    engine: Engine,
    intents: HashMap<usize, Intent>,
}

impl IntentVerifier {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            intents: HashMap::new(),
        }
    }

    /// Attach an intent to a step index. Empty intents are not stored.
    pub fn set_intent(&mut self, index: usize, intent: Intent) {
        if !intent.assertions.is_empty() {
            self.intents.insert(index, intent);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

impl StepVerifier for IntentVerifier {
    fn verify_step(&self, index: usize, output: &Envelope) -> Option<VerificationResult> {
        self.intents
            .get(&index)
            .map(|intent| self.engine.verify(output, intent))
    }
}
