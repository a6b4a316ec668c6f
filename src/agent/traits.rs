//! The agent contract shared by every variant the orchestrator can route to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::sessions::Message;

/// What an agent can do. Used by the classifier prompt and the agents listing,
/// never for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    GeneratesText,
    UsesTools,
    RetrievesKnowledge,
    DelegatesToAgents,
    EscalatesToHuman,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GeneratesText => "generates-text",
            Self::UsesTools => "uses-tools",
            Self::RetrievesKnowledge => "retrieves-knowledge",
            Self::DelegatesToAgents => "delegates-to-agents",
            Self::EscalatesToHuman => "escalates-to-human",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and capability summary of a routable agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique within one orchestrator.
    pub name: String,
    /// Natural-language summary the classifier matches requests against.
    pub description: String,
    pub capabilities: BTreeSet<Capability>,
}

impl AgentDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Result of one `process_request` call.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    /// Always `Role::Assistant`.
    pub message: Message,
    pub tool_calls_made: u32,
    /// Set when a tool loop ran out of budget and the message is the
    /// fallback text.
    pub tool_loop_exceeded: bool,
}

impl AgentReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(text),
            tool_calls_made: 0,
            tool_loop_exceeded: false,
        }
    }

    pub fn output(&self) -> String {
        self.message.text()
    }
}

/// Failures an agent surfaces to the orchestrator, which reroutes them to the
/// fallback agent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("agent '{agent}' is unavailable: {reason}")]
    ServiceUnavailable { agent: String, reason: String },
    #[error("chain '{chain}' aborted at step '{step}': {reason}")]
    ChainAborted {
        chain: String,
        step: String,
        reason: String,
    },
}

/// A unit of capability the orchestrator dispatches turns to.
///
/// Agents never write to conversation history; the orchestrator appends the
/// returned message.
#[async_trait]
pub trait Agent: Send + Sync {
    fn descriptor(&self) -> &AgentDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    async fn process_request(
        &self,
        input: &str,
        user_id: &str,
        session_id: &str,
        history: &[Message],
    ) -> Result<AgentReply, AgentError>;
}
