//! A single agent invocation.
//!
//! The executor never fails: every way an agent call can go wrong is captured
//! in the returned [`Attempt`] so the retry controller can branch on data.

use crate::result::AttemptRecord;
use crate::scenario::Scenario;
use agent::{Agent, AgentError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptErrorKind {
    Timeout,
    AgentError,
    MalformedResponse,
}

impl fmt::Display for AttemptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AttemptErrorKind::Timeout => "timeout",
            AttemptErrorKind::AgentError => "agent_error",
            AttemptErrorKind::MalformedResponse => "malformed_response",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptError {
    pub kind: AttemptErrorKind,
    pub message: String,
}

impl From<AgentError> for AttemptError {
    fn from(err: AgentError) -> Self {
        let kind = if err.is_timeout() {
            AttemptErrorKind::Timeout
        } else if err.is_malformed() {
            AttemptErrorKind::MalformedResponse
        } else {
            AttemptErrorKind::AgentError
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Response(String),
    Failed(AttemptError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    /// 1-based position within the scenario's retry sequence
    pub index: u32,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
    pub started_at: DateTime<Utc>,
}

impl Attempt {
    pub fn response(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Response(text) => Some(text),
            AttemptOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&AttemptError> {
        match &self.outcome {
            AttemptOutcome::Response(_) => None,
            AttemptOutcome::Failed(err) => Some(err),
        }
    }

    /// Diagnostic summary kept on the final result (no response body).
    pub fn record(&self) -> AttemptRecord {
        AttemptRecord {
            index: self.index,
            started_at: self.started_at,
            latency_ms: self.latency.as_millis() as u64,
            error: self.error().cloned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttemptExecutor {
    timeout: Duration,
}

impl AttemptExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(&self, scenario: &Scenario, agent: &dyn Agent, index: u32) -> Attempt {
        let started_at = Utc::now();
        let started = Instant::now();

        let call = agent.generate(&scenario.prompt_template, &scenario.metadata);
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => AttemptOutcome::Response(text),
            Ok(Err(err)) => AttemptOutcome::Failed(AttemptError::from(err)),
            Err(_) => AttemptOutcome::Failed(AttemptError {
                kind: AttemptErrorKind::Timeout,
                message: format!("no response within {:?}", self.timeout),
            }),
        };
        let latency = started.elapsed();

        match &outcome {
            AttemptOutcome::Response(text) => debug!(
                scenario = %scenario.id,
                attempt = index,
                latency_ms = latency.as_millis() as u64,
                length = text.len(),
                "Attempt produced a response"
            ),
            AttemptOutcome::Failed(err) => debug!(
                scenario = %scenario.id,
                attempt = index,
                kind = %err.kind,
                "Attempt failed: {}",
                err.message
            ),
        }

        Attempt {
            index,
            outcome,
            latency,
            started_at,
        }
    }
}
