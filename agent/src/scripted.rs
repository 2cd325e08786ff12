//! Deterministic agent for tests and offline demos.
//!
//! A [`ScriptedAgent`] holds a queue of replies per prompt. Every call to
//! `generate` pops the next reply for that prompt; the last reply in a queue
//! is sticky and keeps being returned once the queue is drained.

use crate::provider::{Agent, AgentError, AgentResult};
use crate::types::Metadata;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub delay: Option<Duration>,
    pub outcome: AgentResult<String>,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            delay: None,
            outcome: Ok(text.into()),
        }
    }

    pub fn error(error: AgentError) -> Self {
        Self {
            delay: None,
            outcome: Err(error),
        }
    }

    /// Shorthand for a transport failure.
    pub fn unavailable() -> Self {
        Self::error(AgentError::Unavailable {
            message: "scripted outage".to_string(),
        })
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Default)]
struct Script {
    replies: VecDeque<ScriptedReply>,
    calls: usize,
}

pub struct ScriptedAgent {
    name: String,
    scripts: Mutex<HashMap<String, Script>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self {
            name: "scripted".to_string(),
            scripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append replies for `prompt`.
    pub fn script<I>(self, prompt: impl Into<String>, replies: I) -> Self
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        self.push_replies(prompt, replies);
        self
    }

    pub fn push_replies<I>(&self, prompt: impl Into<String>, replies: I)
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        let mut scripts = self.lock();
        scripts
            .entry(prompt.into())
            .or_default()
            .replies
            .extend(replies);
    }

    /// Number of times `generate` was called with `prompt`.
    pub fn calls(&self, prompt: &str) -> usize {
        self.lock().get(prompt).map(|s| s.calls).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().values().map(|s| s.calls).sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Script>> {
        self.scripts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_reply(&self, prompt: &str) -> Option<ScriptedReply> {
        let mut scripts = self.lock();
        let script = scripts.get_mut(prompt)?;
        script.calls += 1;
        if script.replies.len() > 1 {
            script.replies.pop_front()
        } else {
            script.replies.front().cloned()
        }
    }
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn generate(&self, prompt: &str, _metadata: &Metadata) -> AgentResult<String> {
        let reply = self.next_reply(prompt).ok_or_else(|| AgentError::Unknown {
            message: format!("no scripted reply for prompt: {}", prompt),
        })?;

        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }

        reply.outcome
    }

    fn name(&self) -> &str {
        &self.name
    }
}
