use crate::error::{ConfigResult, ConfigurationError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Exponential backoff between attempts of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry (in milliseconds)
    pub base_delay_ms: u64,
    /// Upper bound for any single delay (in milliseconds)
    pub max_delay_ms: u64,
    /// Jitter factor for randomizing retry delays (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 5000,
            jitter_factor: 0.1,
        }
    }
}

impl BackoffConfig {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_factor: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Delay before retry number `retry` (1 for the first retry).
    ///
    /// The base delay doubles per retry and never exceeds `max_delay_ms`,
    /// jitter included.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = 2_u32.checked_pow(exponent).unwrap_or(u32::MAX);
        let max_delay = Duration::from_millis(self.max_delay_ms);
        let delay = Duration::from_millis(self.base_delay_ms)
            .saturating_mul(factor)
            .min(max_delay);

        if self.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0.0..=self.jitter_factor);
            let jitter_ms = (delay.as_millis() as f64 * jitter) as u64;
            (delay + Duration::from_millis(jitter_ms)).min(max_delay)
        } else {
            delay
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_delay_ms < self.base_delay_ms {
            return Err(invalid("backoff.max_delay_ms must be >= backoff.base_delay_ms"));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(invalid("backoff.jitter_factor must be between 0.0 and 1.0"));
        }
        Ok(())
    }
}

/// Tunables for an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of scenarios evaluated at the same time
    pub max_concurrency: usize,
    /// Per-attempt timeout for the agent call (in milliseconds)
    pub attempt_timeout_ms: u64,
    pub backoff: BackoffConfig,
    /// Cancel the whole run once this much time has passed (in milliseconds)
    pub run_deadline_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            attempt_timeout_ms: 30_000,
            backoff: BackoffConfig::default(),
            run_deadline_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline_ms = Some(deadline.as_millis() as u64);
        self
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrency < 1 {
            return Err(ConfigurationError::InvalidConcurrency {
                value: self.max_concurrency,
            });
        }
        if self.attempt_timeout_ms == 0 {
            return Err(invalid("attempt_timeout_ms must be greater than 0"));
        }
        if self.run_deadline_ms == Some(0) {
            return Err(invalid("run_deadline_ms must be greater than 0"));
        }
        self.backoff.validate()
    }

    /// Parse and validate a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: EngineConfig =
            toml::from_str(raw).map_err(|e| invalid(format!("Invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }
}

fn invalid(message: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidConfig {
        message: message.into(),
    }
}
