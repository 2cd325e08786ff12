//! Error taxonomy for the evaluation engine.
//!
//! Only [`ConfigurationError`] ever aborts a run. Agent transport failures
//! ([`agent::AgentError`]), predicate failures and cancellation are folded
//! into per-scenario `ERROR` results instead.

use crate::predicate::PredicateKind;
use thiserror::Error;

/// Malformed run definition, detected before any agent call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Scenario '{scenario}' references unknown predicate '{predicate}'")]
    UnknownPredicate { scenario: String, predicate: String },

    #[error("Scenario '{scenario}' lists '{predicate}' as {expected} but it is {actual}")]
    PredicateKindMismatch {
        scenario: String,
        predicate: String,
        expected: PredicateKind,
        actual: PredicateKind,
    },

    #[error("Predicate '{name}' is already registered")]
    DuplicatePredicate { name: String },

    #[error("Scenario id '{id}' appears more than once")]
    DuplicateScenario { id: String },

    #[error("Scenario '{scenario}' has invalid max_attempts {value} (must be >= 1)")]
    InvalidMaxAttempts { scenario: String, value: u32 },

    #[error("Invalid max_concurrency {value} (must be >= 1)")]
    InvalidConcurrency { value: usize },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// A predicate implementation failed while classifying a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Predicate '{predicate}' failed: {message}")]
pub struct PredicateError {
    pub predicate: String,
    pub message: String,
}

impl PredicateError {
    pub fn new(predicate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
pub type PredicateResult<T> = Result<T, PredicateError>;
