use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpAgentConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub bearer_token: Option<String>,
    pub agent_name: String,
}

impl Default for HttpAgentConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/generate".to_string(),
            timeout: Duration::from_secs(30),
            bearer_token: None,
            agent_name: "http".to_string(),
        }
    }
}

impl HttpAgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("Endpoint cannot be empty".to_string());
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err("Endpoint must start with http:// or https://".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        if let Some(token) = &self.bearer_token {
            if token.trim().is_empty() {
                return Err("Bearer token cannot be blank".to_string());
            }
        }

        if self.agent_name.is_empty() {
            return Err("Agent name cannot be empty".to_string());
        }

        Ok(())
    }
}
