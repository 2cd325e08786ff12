//! Bounded-concurrency evaluation of a scenario list.
//!
//! Scenarios are admitted through a semaphore so that at most
//! `max_concurrency` retry controllers are alive at once. Each controller
//! owns its scenario outright; the only shared state is the frozen predicate
//! registry, the agent handle and the cancellation flag.

use crate::attempt::AttemptExecutor;
use crate::cancel::{CancelSignal, CancellationHandle};
use crate::config::EngineConfig;
use crate::error::ConfigResult;
use crate::predicate::PredicateRegistry;
use crate::result::{ErrorDetail, ErrorKind, EvaluationResult};
use crate::retry::RetryController;
use crate::scenario::Scenario;
use crate::scorer::Scorer;
use agent::Agent;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

pub struct EvaluationEngine {
    agent: Arc<dyn Agent>,
    scorer: Arc<Scorer>,
    config: EngineConfig,
}

impl EvaluationEngine {
    pub fn new(
        registry: Arc<PredicateRegistry>,
        agent: Arc<dyn Agent>,
        config: EngineConfig,
    ) -> Self {
        Self {
            agent,
            scorer: Arc::new(Scorer::new(registry)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PredicateRegistry> {
        self.scorer.registry()
    }

    /// Evaluate every scenario and return one result per scenario, in input
    /// order.
    ///
    /// Fails before any agent call if the configuration or a scenario is
    /// invalid.
    pub async fn run(&self, scenarios: Vec<Scenario>) -> ConfigResult<Vec<EvaluationResult>> {
        self.run_with_cancel(scenarios, CancelSignal::never()).await
    }

    /// Like [`run`](Self::run), stopping early once `cancel` fires.
    ///
    /// Scenarios still queued when the run is cancelled, and any attempt in
    /// flight, end as `ERROR` with kind `cancelled`.
    pub async fn run_with_cancel(
        &self,
        scenarios: Vec<Scenario>,
        external: CancelSignal,
    ) -> ConfigResult<Vec<EvaluationResult>> {
        self.config.validate()?;
        self.scorer.registry().validate(&scenarios)?;

        let started = Instant::now();
        let total = scenarios.len();
        info!(
            scenarios = total,
            max_concurrency = self.config.max_concurrency,
            agent = self.agent.name(),
            "Starting evaluation run"
        );

        let (handle, signal) = CancellationHandle::new();
        let forwarder = {
            let handle = handle.clone();
            let mut external = external;
            tokio::spawn(async move {
                external.cancelled().await;
                handle.cancel();
            })
        };
        let deadline = self.config.run_deadline().map(|d| handle.cancel_after(d));

        let results = self.dispatch(&scenarios, signal).await;

        forwarder.abort();
        if let Some(deadline) = deadline {
            deadline.abort();
        }

        let decided = results.iter().filter(|r| r.is_decided()).count();
        info!(
            scenarios = total,
            decided,
            errors = total - decided,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation run finished"
        );
        Ok(results)
    }

    async fn dispatch(
        &self,
        scenarios: &[Scenario],
        mut signal: CancelSignal,
    ) -> Vec<EvaluationResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let executor = AttemptExecutor::new(self.config.attempt_timeout());
        let mut join_set = JoinSet::new();
        let mut task_index = HashMap::new();
        let mut slots: Vec<Option<EvaluationResult>> = vec![None; scenarios.len()];

        for (index, scenario) in scenarios.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = signal.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                slots[index] = Some(EvaluationResult::cancelled(scenario));
                continue;
            };

            let scenario = scenario.clone();
            let agent = Arc::clone(&self.agent);
            let scorer = Arc::clone(&self.scorer);
            let executor = executor.clone();
            let backoff = self.config.backoff.clone();
            let signal = signal.clone();
            let abort = join_set.spawn(async move {
                let _permit = permit;
                let mut controller =
                    RetryController::new(&scenario, agent.as_ref(), &executor, &scorer, &backoff);
                controller.run(signal).await
            });
            task_index.insert(abort.id(), index);
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    if let Some(&index) = task_index.get(&id) {
                        slots[index] = Some(result);
                    }
                }
                Err(err) => {
                    let Some(&index) = task_index.get(&err.id()) else {
                        continue;
                    };
                    error!(scenario = %scenarios[index].id, "Evaluation worker failed: {}", err);
                    slots[index] = Some(worker_failure(&scenarios[index], err.to_string()));
                }
            }
        }

        slots
            .into_iter()
            .zip(scenarios)
            .map(|(slot, scenario)| {
                slot.unwrap_or_else(|| worker_failure(scenario, "worker produced no result"))
            })
            .collect()
    }
}

fn worker_failure(scenario: &Scenario, message: impl Into<String>) -> EvaluationResult {
    EvaluationResult::error(
        scenario,
        ErrorDetail::new(ErrorKind::WorkerFailure, message),
        None,
        Vec::new(),
    )
}
