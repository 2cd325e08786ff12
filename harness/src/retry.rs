//! Per-scenario retry state machine.
//!
//! The controller drives one scenario through:
//! 1. Pending → Attempting
//! 2. Attempting → Decided when a violation or pass is observed, or when the
//!    final attempt produced an unclassifiable response
//! 3. Attempting → Retrying when budget remains after an agent failure or an
//!    inconclusive response
//! 4. Attempting → Exhausted when the final attempt failed at the agent
//! 5. Retrying → Attempting after the backoff delay
//!
//! A violation short-circuits the remaining budget: retrying cannot undo an
//! unsafe response that was already produced.

use crate::attempt::{AttemptError, AttemptExecutor, AttemptOutcome};
use crate::cancel::CancelSignal;
use crate::config::BackoffConfig;
use crate::result::{AttemptRecord, ErrorDetail, ErrorKind, EvaluationResult};
use crate::scenario::Scenario;
use crate::scorer::Scorer;
use agent::Agent;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    Attempting { attempt: u32 },
    Retrying { next_attempt: u32, delay: Duration },
    Decided,
    Exhausted,
    Cancelled,
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Decided | RetryState::Exhausted | RetryState::Cancelled
        )
    }
}

pub struct RetryController<'a> {
    scenario: &'a Scenario,
    agent: &'a dyn Agent,
    executor: &'a AttemptExecutor,
    scorer: &'a Scorer,
    backoff: &'a BackoffConfig,
    state: RetryState,
    records: Vec<AttemptRecord>,
    last_response: Option<String>,
}

impl<'a> RetryController<'a> {
    pub fn new(
        scenario: &'a Scenario,
        agent: &'a dyn Agent,
        executor: &'a AttemptExecutor,
        scorer: &'a Scorer,
        backoff: &'a BackoffConfig,
    ) -> Self {
        Self {
            scenario,
            agent,
            executor,
            scorer,
            backoff,
            state: RetryState::Pending,
            records: Vec::new(),
            last_response: None,
        }
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Drive the scenario to a terminal state and return its single result.
    pub async fn run(&mut self, mut cancel: CancelSignal) -> EvaluationResult {
        loop {
            match self.state.clone() {
                RetryState::Pending => {
                    if cancel.is_cancelled() {
                        return self.cancel(0);
                    }
                    self.transition_to(RetryState::Attempting { attempt: 1 });
                }
                RetryState::Attempting { attempt } => {
                    let (executor, scenario, agent) = (self.executor, self.scenario, self.agent);
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        outcome = executor.execute(scenario, agent, attempt) => Some(outcome),
                    };
                    let Some(outcome) = outcome else {
                        return self.cancel(attempt);
                    };
                    self.records.push(outcome.record());

                    let finished = match outcome.outcome {
                        AttemptOutcome::Response(text) => self.on_response(attempt, text),
                        AttemptOutcome::Failed(err) => self.on_failure(attempt, err),
                    };
                    if let Some(result) = finished {
                        return result;
                    }
                }
                RetryState::Retrying {
                    next_attempt,
                    delay,
                } => {
                    let cancelled = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => true,
                        _ = tokio::time::sleep(delay) => false,
                    };
                    if cancelled {
                        return self.cancel(next_attempt - 1);
                    }
                    self.transition_to(RetryState::Attempting {
                        attempt: next_attempt,
                    });
                }
                RetryState::Decided | RetryState::Exhausted | RetryState::Cancelled => {
                    // A controller runs once; a second call reports a worker bug.
                    return EvaluationResult::error(
                        self.scenario,
                        ErrorDetail::new(
                            ErrorKind::WorkerFailure,
                            "retry controller was run after reaching a terminal state",
                        ),
                        self.last_response.clone(),
                        self.records.clone(),
                    );
                }
            }
        }
    }

    fn on_response(&mut self, attempt: u32, text: String) -> Option<EvaluationResult> {
        let verdict = match self.scorer.score(self.scenario, &text) {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(scenario = %self.scenario.id, attempt, "{}", err);
                self.transition_to(RetryState::Decided);
                return Some(EvaluationResult::error(
                    self.scenario,
                    ErrorDetail::new(ErrorKind::PredicateFailure, err.to_string()),
                    Some(text),
                    self.records.clone(),
                ));
            }
        };

        if verdict.is_decisive() {
            self.transition_to(RetryState::Decided);
            return Some(EvaluationResult::from_verdict(
                self.scenario,
                verdict,
                text,
                self.records.clone(),
            ));
        }

        self.last_response = Some(text);
        if self.has_budget(attempt) {
            debug!(
                scenario = %self.scenario.id,
                attempt,
                "No predicate matched, retrying"
            );
            self.schedule_retry(attempt);
            return None;
        }

        self.transition_to(RetryState::Decided);
        Some(EvaluationResult::error(
            self.scenario,
            ErrorDetail::new(
                ErrorKind::Inconclusive,
                format!(
                    "no predicate matched any response within {} attempt(s)",
                    attempt
                ),
            ),
            self.last_response.clone(),
            self.records.clone(),
        ))
    }

    fn on_failure(&mut self, attempt: u32, err: AttemptError) -> Option<EvaluationResult> {
        if self.has_budget(attempt) {
            warn!(
                scenario = %self.scenario.id,
                attempt,
                kind = %err.kind,
                "Attempt failed, retrying: {}",
                err.message
            );
            self.schedule_retry(attempt);
            return None;
        }

        warn!(
            scenario = %self.scenario.id,
            attempts = attempt,
            kind = %err.kind,
            "Attempt budget exhausted: {}",
            err.message
        );
        self.transition_to(RetryState::Exhausted);
        Some(EvaluationResult::error(
            self.scenario,
            ErrorDetail::new(err.kind.into(), err.message),
            self.last_response.clone(),
            self.records.clone(),
        ))
    }

    /// `started` counts attempts that were begun, including an abandoned
    /// in-flight one that has no record.
    fn cancel(&mut self, started: u32) -> EvaluationResult {
        self.transition_to(RetryState::Cancelled);
        let mut result = EvaluationResult::error(
            self.scenario,
            ErrorDetail::new(ErrorKind::Cancelled, "cancelled"),
            self.last_response.clone(),
            self.records.clone(),
        );
        result.attempts_used = started;
        result
    }

    fn has_budget(&self, attempt: u32) -> bool {
        attempt < self.scenario.max_attempts
    }

    fn schedule_retry(&mut self, attempt: u32) {
        let delay = self.backoff.delay_for_retry(attempt);
        self.transition_to(RetryState::Retrying {
            next_attempt: attempt + 1,
            delay,
        });
    }

    fn transition_to(&mut self, new_state: RetryState) {
        debug!(
            scenario = %self.scenario.id,
            "State transition: {:?} → {:?}",
            self.state,
            new_state
        );
        self.state = new_state;
    }
}
