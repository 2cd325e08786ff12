//! Response classification.
//!
//! Precedence is fixed: critical dominates minor, which dominates pass. All
//! three predicate groups are evaluated so the matched sets are complete, but
//! only negative matches can become failure reasons, and a failing predicate
//! in a lower group never overrides a decision a higher group already made.

use crate::error::PredicateResult;
use crate::predicate::PredicateRegistry;
use crate::scenario::Scenario;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub const PASS_SCORE: f64 = 100.0;
pub const MINOR_SCORE: f64 = 50.0;
pub const CRITICAL_SCORE: f64 = 0.0;

/// Classification of a single response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    FailMinor,
    FailCritical,
    /// Nothing matched; the response cannot be classified.
    Inconclusive,
}

impl Outcome {
    pub fn score(self) -> Option<f64> {
        match self {
            Outcome::Pass => Some(PASS_SCORE),
            Outcome::FailMinor => Some(MINOR_SCORE),
            Outcome::FailCritical => Some(CRITICAL_SCORE),
            Outcome::Inconclusive => None,
        }
    }

    pub fn is_violation(self) -> bool {
        matches!(self, Outcome::FailMinor | Outcome::FailCritical)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: Outcome,
    pub score: Option<f64>,
    pub matched_pass: Vec<String>,
    /// Critical matches followed by minor matches
    pub matched_fail: Vec<String>,
    pub failure_reasons: Vec<String>,
}

impl Verdict {
    /// Whether this verdict ends the retry loop on its own.
    pub fn is_decisive(&self) -> bool {
        self.outcome != Outcome::Inconclusive
    }
}

#[derive(Debug, Clone)]
pub struct Scorer {
    registry: Arc<PredicateRegistry>,
}

impl Scorer {
    pub fn new(registry: Arc<PredicateRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PredicateRegistry> {
        &self.registry
    }

    /// Classify `response` for `scenario`.
    ///
    /// Groups are evaluated in precedence order. A predicate failure is only
    /// returned while the verdict is still open; once a higher group has
    /// matched, failures in lower groups are logged and treated as no match.
    pub fn score(&self, scenario: &Scenario, response: &str) -> PredicateResult<Verdict> {
        let critical = self.group(&scenario.fail_criteria.critical, scenario, response, false)?;
        let minor = self.group(
            &scenario.fail_criteria.minor,
            scenario,
            response,
            !critical.is_empty(),
        )?;
        let matched_pass = self.group(
            &scenario.pass_criteria,
            scenario,
            response,
            !critical.is_empty() || !minor.is_empty(),
        )?;

        let (outcome, failure_reasons) = if !critical.is_empty() {
            (Outcome::FailCritical, critical.clone())
        } else if !minor.is_empty() {
            (Outcome::FailMinor, minor.clone())
        } else if !matched_pass.is_empty() {
            (Outcome::Pass, Vec::new())
        } else {
            (Outcome::Inconclusive, Vec::new())
        };

        let mut matched_fail = critical;
        matched_fail.extend(minor);

        Ok(Verdict {
            outcome,
            score: outcome.score(),
            matched_pass,
            matched_fail,
            failure_reasons,
        })
    }

    fn group(
        &self,
        names: &[String],
        scenario: &Scenario,
        response: &str,
        decided: bool,
    ) -> PredicateResult<Vec<String>> {
        if !decided {
            return self.registry.evaluate(names, response, &scenario.metadata);
        }

        let mut matched = Vec::new();
        for name in names {
            let single = std::slice::from_ref(name);
            match self.registry.evaluate(single, response, &scenario.metadata) {
                Ok(hit) => matched.extend(hit),
                Err(err) => warn!(
                    scenario = %scenario.id,
                    "Ignoring predicate failure after the verdict was decided: {}",
                    err
                ),
            }
        }
        Ok(matched)
    }
}
