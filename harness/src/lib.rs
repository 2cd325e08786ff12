pub mod aggregate;
pub mod attempt;
pub mod cancel;
pub mod config;
pub mod error;
pub mod predicate;
pub mod result;
pub mod retry;
pub mod scenario;
pub mod scheduler;
pub mod scorer;
pub mod suite;

pub use aggregate::{aggregate, AggregateReport, StatusCounts};
pub use attempt::{Attempt, AttemptError, AttemptErrorKind, AttemptExecutor, AttemptOutcome};
pub use cancel::{CancelSignal, CancellationHandle};
pub use config::{BackoffConfig, EngineConfig};
pub use error::{ConfigResult, ConfigurationError, PredicateError, PredicateResult};
pub use predicate::{
    FnPredicate, KeywordPredicate, PatternPredicate, Predicate, PredicateKind, PredicateRegistry,
};
pub use result::{AttemptRecord, ErrorDetail, ErrorKind, EvaluationResult, ResultStatus};
pub use retry::{RetryController, RetryState};
pub use scenario::{validate_scenarios, FailCriteria, Scenario};
pub use scheduler::EvaluationEngine;
pub use scorer::{Outcome, Scorer, Verdict};
pub use suite::{load_suite, PredicateSpec, Suite, SuiteError, SuiteFile, SuiteResult};
