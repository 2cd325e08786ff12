use crate::attempt::{AttemptError, AttemptErrorKind};
use crate::scenario::Scenario;
use crate::scorer::{Outcome, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Final status of one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Pass,
    FailMinor,
    FailCritical,
    /// Measurement failure, never a policy verdict
    Error,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResultStatus::Pass => "PASS",
            ResultStatus::FailMinor => "FAIL_MINOR",
            ResultStatus::FailCritical => "FAIL_CRITICAL",
            ResultStatus::Error => "ERROR",
        };
        f.pad(label)
    }
}

/// Why a scenario ended in `ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    AgentError,
    MalformedResponse,
    /// No predicate matched on the final attempt
    Inconclusive,
    PredicateFailure,
    Cancelled,
    /// The worker evaluating the scenario panicked
    WorkerFailure,
}

impl From<AttemptErrorKind> for ErrorKind {
    fn from(kind: AttemptErrorKind) -> Self {
        match kind {
            AttemptErrorKind::Timeout => ErrorKind::Timeout,
            AttemptErrorKind::AgentError => ErrorKind::AgentError,
            AttemptErrorKind::MalformedResponse => ErrorKind::MalformedResponse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Per-attempt diagnostics attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub index: u32,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AttemptError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub scenario_id: String,
    pub status: ResultStatus,
    /// `None` for `ERROR`, which never contributes to the safety score
    pub score: Option<f64>,
    pub attempts_used: u32,
    pub final_response: Option<String>,
    pub matched_pass_predicates: Vec<String>,
    pub matched_fail_predicates: Vec<String>,
    pub failure_reasons: Vec<String>,
    pub error_detail: Option<ErrorDetail>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
}

impl EvaluationResult {
    /// Result for a decisive verdict.
    ///
    /// Panics in debug builds if handed an inconclusive verdict; callers turn
    /// those into errors themselves.
    pub fn from_verdict(
        scenario: &Scenario,
        verdict: Verdict,
        response: String,
        attempts: Vec<AttemptRecord>,
    ) -> Self {
        debug_assert!(verdict.is_decisive());
        let status = match verdict.outcome {
            Outcome::Pass => ResultStatus::Pass,
            Outcome::FailMinor => ResultStatus::FailMinor,
            Outcome::FailCritical => ResultStatus::FailCritical,
            Outcome::Inconclusive => ResultStatus::Error,
        };
        Self {
            scenario_id: scenario.id.clone(),
            status,
            score: verdict.score,
            attempts_used: attempts.len() as u32,
            final_response: Some(response),
            matched_pass_predicates: verdict.matched_pass,
            matched_fail_predicates: verdict.matched_fail,
            failure_reasons: verdict.failure_reasons,
            error_detail: None,
            tags: scenario.tags.clone(),
            attempts,
        }
    }

    pub fn error(
        scenario: &Scenario,
        detail: ErrorDetail,
        final_response: Option<String>,
        attempts: Vec<AttemptRecord>,
    ) -> Self {
        Self {
            scenario_id: scenario.id.clone(),
            status: ResultStatus::Error,
            score: None,
            attempts_used: attempts.len() as u32,
            final_response,
            matched_pass_predicates: Vec::new(),
            matched_fail_predicates: Vec::new(),
            failure_reasons: Vec::new(),
            error_detail: Some(detail),
            tags: scenario.tags.clone(),
            attempts,
        }
    }

    /// Error result for a scenario cancelled before it started.
    pub fn cancelled(scenario: &Scenario) -> Self {
        Self::error(
            scenario,
            ErrorDetail::new(ErrorKind::Cancelled, "cancelled"),
            None,
            Vec::new(),
        )
    }

    pub fn is_decided(&self) -> bool {
        self.status != ResultStatus::Error
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_detail.as_ref().map(|d| d.kind)
    }
}
