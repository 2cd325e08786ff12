use agent::{HttpAgent, HttpAgentConfig};
use clap::{Parser, Subcommand};
use harness::{
    aggregate, load_suite, CancellationHandle, EngineConfig, EvaluationEngine, ResultStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Run adversarial scenario suites against an agent endpoint")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a suite against an HTTP agent
    Run {
        /// Suite file or directory of suite files
        #[arg(short, long)]
        suite: PathBuf,
        /// Agent endpoint accepting POST {"prompt", "metadata"}
        #[arg(short, long, default_value = "http://localhost:8000/generate")]
        endpoint: String,
        /// Engine configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override max_concurrency from the config file
        #[arg(long)]
        max_concurrency: Option<usize>,
        /// Override attempt_timeout_ms from the config file
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Write the JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// Load and validate a suite without calling the agent
    Validate {
        /// Suite file or directory of suite files
        #[arg(short, long)]
        suite: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Run { verbose: true, .. });
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Run {
            suite,
            endpoint,
            config,
            max_concurrency,
            timeout_ms,
            output,
            ..
        } => {
            let mut engine_config = match config {
                Some(path) => EngineConfig::load(path)?,
                None => EngineConfig::default(),
            };
            if let Some(max_concurrency) = max_concurrency {
                engine_config.max_concurrency = max_concurrency;
            }
            if let Some(timeout_ms) = timeout_ms {
                engine_config.attempt_timeout_ms = timeout_ms;
            }

            let clean = run_suite(suite, endpoint, engine_config, output).await?;
            if !clean {
                std::process::exit(1);
            }
        }
        Commands::Validate { suite } => {
            let suite = load_suite(&suite)?;
            println!(
                "Suite OK: {} predicates, {} scenarios",
                suite.registry.len(),
                suite.len()
            );
            for name in suite.registry.list_predicates() {
                println!("  predicate {}", name);
            }
        }
    }

    Ok(())
}

/// Returns whether the run finished without critical failures or errors.
async fn run_suite(
    suite_path: PathBuf,
    endpoint: String,
    engine_config: EngineConfig,
    output: Option<PathBuf>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let suite = load_suite(&suite_path)?;

    // Client timeout stays above the engine's per-attempt timeout.
    let http_config = HttpAgentConfig::new()
        .with_endpoint(endpoint)
        .with_timeout(engine_config.attempt_timeout() + Duration::from_secs(1));
    let http_config = match std::env::var("HARNESS_AGENT_TOKEN") {
        Ok(token) if !token.is_empty() => http_config.with_bearer_token(token),
        _ => http_config,
    };
    let agent = HttpAgent::new(http_config)?;

    let engine = EvaluationEngine::new(suite.registry.clone(), Arc::new(agent), engine_config);

    let (handle, signal) = CancellationHandle::new();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining scenarios");
            handle.cancel();
        }
    });

    let results = engine.run_with_cancel(suite.scenarios, signal).await?;
    interrupt.abort();

    let report = aggregate(results);
    for result in &report.results {
        match result.status {
            ResultStatus::Pass => {}
            ResultStatus::Error => error!(
                scenario = %result.scenario_id,
                attempts = result.attempts_used,
                "{}: {}",
                result.status,
                result
                    .error_detail
                    .as_ref()
                    .map(|d| d.message.as_str())
                    .unwrap_or("unknown error")
            ),
            _ => warn!(
                scenario = %result.scenario_id,
                reasons = ?result.failure_reasons,
                "{}",
                result.status
            ),
        }
    }
    println!("{}", report);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), run_id = %report.run_id, "Report written");
    }

    Ok(report.is_clean())
}
