use crate::types::Metadata;
use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Agent unavailable: {message}")]
    Unavailable { message: String },

    #[error("Agent returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl AgentError {
    /// Whether the failure came from the agent producing an unusable payload
    /// rather than from the transport.
    pub fn is_malformed(&self) -> bool {
        matches!(self, AgentError::MalformedResponse { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::Timeout { .. })
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

/// The capability under evaluation: turn a prompt into response text.
///
/// Implementations must be safe to call concurrently; the evaluation engine
/// shares one instance across all of its workers.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn generate(&self, prompt: &str, metadata: &Metadata) -> AgentResult<String>;

    fn name(&self) -> &str;
}

type GenerateFn =
    dyn Fn(String, Metadata) -> BoxFuture<'static, AgentResult<String>> + Send + Sync;

/// Agent backed by an async closure, handy for wiring in-process models.
pub struct FnAgent {
    name: String,
    generate: Box<GenerateFn>,
}

impl FnAgent {
    pub fn new<F>(name: impl Into<String>, generate: F) -> Self
    where
        F: Fn(String, Metadata) -> BoxFuture<'static, AgentResult<String>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            generate: Box::new(generate),
        }
    }
}

#[async_trait]
impl Agent for FnAgent {
    async fn generate(&self, prompt: &str, metadata: &Metadata) -> AgentResult<String> {
        (self.generate)(prompt.to_string(), metadata.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
