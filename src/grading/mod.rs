//! # Grading
//!
//! Decides pass/fail for a submitted event log against a reference log.
//! Both logs are reduced to canonical events by the [`Normalizer`] and then
//! compared by signature counts and total delay in [`compare`].
//!
//! Grading never fails on malformed input: anything that is not an array of
//! events is treated as an empty log.

pub mod comparator;
pub mod normalizer;
pub mod store;

pub use comparator::{compare, Verdict};
pub use normalizer::{canonicalize, marked_iteration, CanonicalEvent, Normalizer, Signature};
pub use store::{GradingRecord, MemoryResultStore, ResultStore};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradeRequest {
    pub expected_canonical: Value,
    pub submitted_raw: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResponse {
    pub pass: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

impl From<Verdict> for GradeResponse {
    fn from(verdict: Verdict) -> Self {
        GradeResponse {
            pass: verdict.pass,
            reason: verdict.reason,
        }
    }
}

/// Grade one request with the given engine settings.
pub fn grade(request: &GradeRequest, config: &EngineConfig) -> GradeResponse {
    let normalizer = Normalizer::new(config.normalizer.clone());
    let expected = normalizer.expected(&request.expected_canonical);
    let submitted = normalizer.representative(&request.submitted_raw);
    debug!(
        "grading {} expected against {} submitted events",
        expected.len(),
        submitted.len()
    );
    compare(&expected, &submitted, config.grading.delay_tolerance_ms).into()
}

/// A grading request tied to the learner and assignment it belongs to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingAttempt {
    pub assignment_id: String,
    pub learner_id: String,
    #[serde(flatten)]
    pub request: GradeRequest,
}

/// Grades attempts and records each one in a [`ResultStore`].
pub struct Grader<S> {
    config: EngineConfig,
    store: S,
}

impl<S: ResultStore> Grader<S> {
    pub fn new(config: EngineConfig, store: S) -> Self {
        Grader { config, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn grade(&self, request: &GradeRequest) -> GradeResponse {
        grade(request, &self.config)
    }

    /// Grade and record. A store failure is logged; the verdict stands.
    pub async fn verify(&self, attempt: GradingAttempt) -> GradeResponse {
        let response = self.grade(&attempt.request);
        let record = GradingRecord {
            assignment_id: attempt.assignment_id,
            learner_id: attempt.learner_id,
            pass: response.pass,
            submitted_raw: attempt.request.submitted_raw,
        };
        if let Err(e) = self.store.record(record).await {
            warn!("failed to record grading attempt: {}", e);
        }
        response
    }
}
