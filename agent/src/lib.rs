pub mod config;
pub mod provider;
pub mod scripted;
pub mod types;

#[cfg(feature = "http")]
pub mod http;

pub use config::HttpAgentConfig;
pub use provider::{Agent, AgentError, AgentResult, FnAgent};
pub use scripted::{ScriptedAgent, ScriptedReply};
pub use types::{GenerateRequest, GenerateResponse, Metadata};

#[cfg(feature = "http")]
pub use http::HttpAgent;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::provider::*;
    pub use crate::scripted::*;
    pub use crate::types::*;

    #[cfg(feature = "http")]
    pub use crate::http::*;
}
