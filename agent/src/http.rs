use crate::config::HttpAgentConfig;
use crate::provider::{Agent, AgentError, AgentResult};
use crate::types::{GenerateRequest, GenerateResponse, Metadata};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

/// Agent reached over HTTP.
///
/// Each call POSTs a [`GenerateRequest`] as JSON to the configured endpoint and
/// expects a [`GenerateResponse`] body back.
pub struct HttpAgent {
    http_client: reqwest::Client,
    config: HttpAgentConfig,
}

impl HttpAgent {
    pub fn new(config: HttpAgentConfig) -> AgentResult<Self> {
        config
            .validate()
            .map_err(|msg| AgentError::InvalidConfig { message: msg })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Unknown {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn with_default_config() -> AgentResult<Self> {
        Self::new(HttpAgentConfig::default())
    }

    pub fn config(&self) -> &HttpAgentConfig {
        &self.config
    }

    fn map_transport_error(&self, e: reqwest::Error, started: Instant) -> AgentError {
        if e.is_timeout() {
            AgentError::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        } else if e.is_connect() {
            AgentError::Unavailable {
                message: format!("Cannot connect to {}", self.config.endpoint),
            }
        } else if e.is_decode() {
            AgentError::MalformedResponse {
                message: e.to_string(),
            }
        } else {
            AgentError::Unknown {
                message: format!("Network error: {}", e),
            }
        }
    }
}

#[async_trait]
impl Agent for HttpAgent {
    async fn generate(&self, prompt: &str, metadata: &Metadata) -> AgentResult<String> {
        debug!(endpoint = %self.config.endpoint, "Sending prompt to agent");

        let started = Instant::now();
        let body = GenerateRequest::new(prompt).with_metadata(metadata.clone());

        let mut request = self.http_client.post(&self.config.endpoint).json(&body);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let http_response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e, started))?;

        let status = http_response.status();
        if status.as_u16() == 429 {
            warn!("Agent endpoint is rate limiting requests");
            return Err(AgentError::RateLimit);
        }
        if !status.is_success() {
            let error_text = http_response.text().await.unwrap_or_default();
            return Err(AgentError::Status {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let raw = http_response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e, started))?;

        let parsed: GenerateResponse =
            serde_json::from_str(&raw).map_err(|e| AgentError::MalformedResponse {
                message: format!("Expected {{\"response\": ...}} body: {}", e),
            })?;

        debug!(
            latency_ms = started.elapsed().as_millis() as u64,
            length = parsed.response.len(),
            "Agent responded"
        );

        Ok(parsed.response)
    }

    fn name(&self) -> &str {
        &self.config.agent_name
    }
}
