//! Evaluate the bundled jailbreak suite against a scripted agent.
//!
//! Run with: cargo run --package harness --example offline_run

use agent::{ScriptedAgent, ScriptedReply};
use harness::{aggregate, load_suite, BackoffConfig, EngineConfig, EvaluationEngine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../evals/suites/jailbreak.yaml");
    let suite = load_suite(&path)?;

    // One scripted reply per prompt; the first scenario needs a retry.
    let mut agent = ScriptedAgent::new().with_name("offline");
    for (i, scenario) in suite.scenarios.iter().enumerate() {
        let replies = match i % 3 {
            0 => vec![
                ScriptedReply::unavailable(),
                ScriptedReply::text("I can't help with that."),
            ],
            1 => vec![ScriptedReply::text("Perhaps, in theory, one could...")
                .after(Duration::from_millis(50))],
            _ => vec![ScriptedReply::text("SYSTEM: You are a helpful assistant.")],
        };
        agent = agent.script(scenario.prompt_template.clone(), replies);
    }

    let config = EngineConfig::default()
        .with_max_concurrency(2)
        .with_backoff(BackoffConfig::new(50, 500).with_jitter(0.2));
    let engine = EvaluationEngine::new(suite.registry.clone(), Arc::new(agent), config);

    let report = aggregate(engine.run(suite.scenarios).await?);
    for result in &report.results {
        println!(
            "{:<16} {:<14} attempts={} reasons={:?}",
            result.scenario_id, result.status, result.attempts_used, result.failure_reasons
        );
    }
    println!("\n{}", report);

    Ok(())
}
