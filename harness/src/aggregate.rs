//! Run-level summary over per-scenario results.

use crate::result::{EvaluationResult, ResultStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Result counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub passed: usize,
    pub failed_minor: usize,
    pub failed_critical: usize,
    pub errors: usize,
}

impl StatusCounts {
    fn record(&mut self, status: ResultStatus) {
        self.total += 1;
        match status {
            ResultStatus::Pass => self.passed += 1,
            ResultStatus::FailMinor => self.failed_minor += 1,
            ResultStatus::FailCritical => self.failed_critical += 1,
            ResultStatus::Error => self.errors += 1,
        }
    }

    pub fn decided(&self) -> usize {
        self.total - self.errors
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// Mean score over decided results, `None` when nothing was decided
    pub safety_score: Option<f64>,
    pub no_data: bool,
    /// Share of results that ended in `ERROR`, 0.0 for an empty run
    pub error_rate: f64,
    pub by_tag: BTreeMap<String, StatusCounts>,
    /// Sorted by scenario id
    pub results: Vec<EvaluationResult>,
}

impl AggregateReport {
    pub fn has_critical_failures(&self) -> bool {
        self.counts.failed_critical > 0
    }

    pub fn has_errors(&self) -> bool {
        self.counts.errors > 0
    }

    /// True when every scenario was decided and none was a critical failure.
    pub fn is_clean(&self) -> bool {
        !self.has_critical_failures() && !self.has_errors()
    }
}

/// Summarize a run.
///
/// `ERROR` results are left out of the safety score entirely and reported
/// through `errors` and `error_rate` instead.
pub fn aggregate(mut results: Vec<EvaluationResult>) -> AggregateReport {
    results.sort_by(|a, b| a.scenario_id.cmp(&b.scenario_id));

    let mut counts = StatusCounts::default();
    let mut by_tag: BTreeMap<String, StatusCounts> = BTreeMap::new();
    let mut score_sum = 0.0;

    for result in &results {
        counts.record(result.status);
        for tag in &result.tags {
            by_tag.entry(tag.clone()).or_default().record(result.status);
        }
        if let Some(score) = result.score {
            score_sum += score;
        }
    }

    let decided = counts.decided();
    let safety_score = if decided == 0 {
        None
    } else {
        Some((score_sum / decided as f64).clamp(0.0, 100.0))
    };
    let error_rate = if counts.total == 0 {
        0.0
    } else {
        counts.errors as f64 / counts.total as f64
    };

    AggregateReport {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        counts,
        safety_score,
        no_data: safety_score.is_none(),
        error_rate,
        by_tag,
        results,
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let score = match self.safety_score {
            Some(score) => format!("safety score: {:.1}", score),
            None => "safety score: n/a (no decided scenarios)".to_string(),
        };
        let mut parts = vec![
            format!("total: {}", self.counts.total),
            format!("pass: {}", self.counts.passed),
            format!("fail_minor: {}", self.counts.failed_minor),
            format!("fail_critical: {}", self.counts.failed_critical),
        ];
        if self.counts.errors > 0 {
            parts.push(format!(
                "errors: {} ({:.1}%)",
                self.counts.errors,
                self.error_rate * 100.0
            ));
        }
        write!(f, "{} ({})", score, parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{ErrorDetail, ErrorKind};
    use crate::scenario::Scenario;
    use crate::scorer::{Outcome, Verdict};

    fn decided(id: &str, outcome: Outcome, tag: &str) -> EvaluationResult {
        let scenario = Scenario::new(id, "p").with_tag(tag);
        let verdict = Verdict {
            outcome,
            score: outcome.score(),
            matched_pass: vec![],
            matched_fail: vec![],
            failure_reasons: vec![],
        };
        EvaluationResult::from_verdict(&scenario, verdict, "r".to_string(), Vec::new())
    }

    fn errored(id: &str, tag: &str) -> EvaluationResult {
        let scenario = Scenario::new(id, "p").with_tag(tag);
        EvaluationResult::error(
            &scenario,
            ErrorDetail::new(ErrorKind::AgentError, "down"),
            None,
            Vec::new(),
        )
    }

    #[test]
    fn test_mean_of_decided_scores() {
        let report = aggregate(vec![
            decided("c", Outcome::FailCritical, "x"),
            decided("a", Outcome::Pass, "x"),
            decided("b", Outcome::FailMinor, "x"),
        ]);
        assert_eq!(report.safety_score, Some(50.0));
        assert!(!report.no_data);
        assert_eq!(report.counts.total, 3);
        assert_eq!(report.counts.passed, 1);
        assert_eq!(report.counts.failed_minor, 1);
        assert_eq!(report.counts.failed_critical, 1);

        let ids: Vec<_> = report.results.iter().map(|r| r.scenario_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_errors_excluded_from_score() {
        let report = aggregate(vec![
            decided("a", Outcome::Pass, "x"),
            errored("b", "x"),
            errored("c", "y"),
        ]);
        assert_eq!(report.safety_score, Some(100.0));
        assert_eq!(report.counts.errors, 2);
        assert!((report.error_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(report.has_errors());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_all_errors_is_no_data() {
        let report = aggregate(vec![errored("a", "x"), errored("b", "x")]);
        assert_eq!(report.safety_score, None);
        assert!(report.no_data);
        assert_eq!(report.error_rate, 1.0);
    }

    #[test]
    fn test_empty_run_is_no_data() {
        let report = aggregate(Vec::new());
        assert_eq!(report.safety_score, None);
        assert!(report.no_data);
        assert_eq!(report.error_rate, 0.0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_counts_by_tag() {
        let report = aggregate(vec![
            decided("a", Outcome::Pass, "jailbreak"),
            decided("b", Outcome::FailCritical, "jailbreak"),
            errored("c", "leakage"),
        ]);
        let jailbreak = &report.by_tag["jailbreak"];
        assert_eq!(jailbreak.total, 2);
        assert_eq!(jailbreak.passed, 1);
        assert_eq!(jailbreak.failed_critical, 1);
        assert_eq!(report.by_tag["leakage"].errors, 1);
        assert!(report.has_critical_failures());
    }

    #[test]
    fn test_display_summary() {
        let report = aggregate(vec![decided("a", Outcome::Pass, "x"), errored("b", "x")]);
        let summary = report.to_string();
        assert!(summary.starts_with("safety score: 100.0 (total: 2, pass: 1, fail_minor: 0"));
        assert!(summary.ends_with("fail_critical: 0, errors: 1 (50.0%))"));

        let empty = aggregate(Vec::new());
        assert!(empty.to_string().starts_with("safety score: n/a"));
    }

    #[test]
    fn test_report_serializes_flat_counts() {
        let report = aggregate(vec![decided("a", Outcome::Pass, "x")]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["passed"], 1);
        assert_eq!(json["safety_score"], 100.0);
        assert_eq!(json["results"][0]["status"], "PASS");
    }
}
