//! Sequential composition of agents.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::traits::{Agent, AgentDescriptor, AgentError, AgentReply, Capability};
use crate::sessions::Message;

/// When the optional verifier step runs.
#[derive(Clone)]
pub enum VerifyPolicy {
    /// Every chain output passes through the verifier.
    Always,
    /// Only outputs for which the predicate returns true are verified.
    WhenOutputMatches(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl std::fmt::Debug for VerifyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::WhenOutputMatches(_) => f.write_str("WhenOutputMatches(..)"),
        }
    }
}

impl VerifyPolicy {
    fn applies_to(&self, output: &str) -> bool {
        match self {
            Self::Always => true,
            Self::WhenOutputMatches(predicate) => predicate(output),
        }
    }
}

/// Feeds the output of step *i* into step *i + 1* and returns the last output.
///
/// Any failing or timed-out step aborts the chain; no partial output escapes.
pub struct ChainAgent {
    descriptor: AgentDescriptor,
    steps: Vec<Arc<dyn Agent>>,
    verifier: Option<(Arc<dyn Agent>, VerifyPolicy)>,
    step_timeout: Option<Duration>,
}

impl std::fmt::Debug for ChainAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainAgent")
            .field("name", &self.descriptor.name)
            .field(
                "steps",
                &self.steps.iter().map(|a| a.name().to_string()).collect::<Vec<_>>(),
            )
            .field("verifier", &self.verifier.as_ref().map(|(a, p)| (a.name(), p)))
            .field("step_timeout", &self.step_timeout)
            .finish()
    }
}

impl ChainAgent {
    pub fn new(name: &str, description: &str, steps: Vec<Arc<dyn Agent>>) -> Result<Self> {
        if steps.is_empty() {
            bail!("chain agent '{name}' needs at least one step");
        }
        let mut capabilities = vec![Capability::DelegatesToAgents];
        for step in &steps {
            capabilities.extend(step.descriptor().capabilities.iter().copied());
        }
        Ok(Self {
            descriptor: AgentDescriptor::new(name, description, capabilities),
            steps,
            verifier: None,
            step_timeout: None,
        })
    }

    /// Insert a verifier before the terminal output, gated by `policy`.
    pub fn with_verifier(mut self, verifier: Arc<dyn Agent>, policy: VerifyPolicy) -> Self {
        self.descriptor
            .capabilities
            .extend(verifier.descriptor().capabilities.iter().copied());
        self.verifier = Some((verifier, policy));
        self
    }

    /// Bound each step's processing time.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|a| a.name()).collect()
    }

    async fn run_step(
        &self,
        step: &Arc<dyn Agent>,
        input: &str,
        user_id: &str,
        session_id: &str,
        history: &[Message],
    ) -> Result<AgentReply, AgentError> {
        let call = step.process_request(input, user_id, session_id, history);
        let outcome = match self.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(self.abort(step, format!("timed out after {}ms", limit.as_millis())))
                }
            },
            None => call.await,
        };
        outcome.map_err(|e| self.abort(step, e.to_string()))
    }

    fn abort(&self, step: &Arc<dyn Agent>, reason: String) -> AgentError {
        tracing::warn!(
            chain = %self.descriptor.name,
            step = step.name(),
            reason = %reason,
            "Chain step failed, aborting chain"
        );
        AgentError::ChainAborted {
            chain: self.descriptor.name.clone(),
            step: step.name().to_string(),
            reason,
        }
    }
}

#[async_trait]
impl Agent for ChainAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn process_request(
        &self,
        input: &str,
        user_id: &str,
        session_id: &str,
        history: &[Message],
    ) -> Result<AgentReply, AgentError> {
        let mut current = input.to_string();
        let mut last: Option<AgentReply> = None;
        let mut tool_calls_made = 0u32;
        let mut tool_loop_exceeded = false;

        for step in &self.steps {
            let reply = self
                .run_step(step, &current, user_id, session_id, history)
                .await?;
            tool_calls_made += reply.tool_calls_made;
            tool_loop_exceeded |= reply.tool_loop_exceeded;
            current = reply.output();
            last = Some(reply);
        }

        if let Some((agent, policy)) = &self.verifier {
            if policy.applies_to(&current) {
                tracing::debug!(
                    chain = %self.descriptor.name,
                    verifier = agent.name(),
                    "Verifying chain output"
                );
                let reply = self
                    .run_step(agent, &current, user_id, session_id, history)
                    .await?;
                tool_calls_made += reply.tool_calls_made;
                tool_loop_exceeded |= reply.tool_loop_exceeded;
                last = Some(reply);
            }
        }

        let message = match last {
            Some(reply) => reply.message,
            None => Message::assistant(current),
        };
        Ok(AgentReply {
            message,
            tool_calls_made,
            tool_loop_exceeded,
        })
    }
}
