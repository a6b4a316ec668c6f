//! The routing façade: load history, classify, dispatch, record the turn.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::registry::AgentRegistry;
use super::traits::{InboundRequest, RouteMetadata, RouteResponse, Router};
use crate::agent::{Agent, AgentDescriptor, AgentReply, AgentSelector, FallbackReason};
use crate::observability::RouterMetrics;
use crate::sessions::{ConversationStore, Message, SessionKey, TruncationPolicy};

/// Returned when even the fallback agent cannot answer.
pub const UNAVAILABLE_MESSAGE: &str =
    "We're unable to process your request right now. Please try again shortly.";

/// A finished turn that has not yet been written to history.
struct Turn {
    agent_name: String,
    reply: AgentReply,
    fallback_reason: Option<FallbackReason>,
}

pub struct Orchestrator {
    store: Arc<dyn ConversationStore>,
    registry: AgentRegistry,
    fallback: Arc<dyn Agent>,
    selector: AgentSelector,
    history_policy: TruncationPolicy,
    metrics: RouterMetrics,
}

impl Orchestrator {
    /// `fallback` handles every turn the classifier cannot confidently place
    /// and every turn whose agent fails. It may also be registered as a
    /// regular agent.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        registry: AgentRegistry,
        fallback: Arc<dyn Agent>,
        selector: AgentSelector,
    ) -> Result<Self> {
        if selector.fallback_agent() != fallback.name() {
            anyhow::bail!(
                "selector falls back to '{}' but the fallback agent is '{}'",
                selector.fallback_agent(),
                fallback.name()
            );
        }
        Ok(Self {
            store,
            registry,
            fallback,
            selector,
            history_policy: TruncationPolicy::default(),
            metrics: RouterMetrics::new()?,
        })
    }

    pub fn with_history_policy(mut self, policy: TruncationPolicy) -> Self {
        self.history_policy = policy;
        self
    }

    pub fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    pub fn fallback_agent(&self) -> &str {
        self.fallback.name()
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Candidates offered to the classifier: the registry plus the fallback
    /// agent. Empty when nothing is registered.
    fn candidates(&self) -> Vec<AgentDescriptor> {
        if self.registry.is_empty() {
            return Vec::new();
        }
        let mut descriptors = self.registry.descriptors();
        if self.registry.get(self.fallback.name()).is_none() {
            descriptors.push(self.fallback.descriptor().clone());
        }
        descriptors
    }

    fn resolve(&self, name: &str) -> Arc<dyn Agent> {
        self.registry
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    async fn run_turn(&self, request: &InboundRequest, key: &SessionKey) -> Turn {
        let history = match self.store.truncate(key, &self.history_policy).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(
                    session = %key,
                    error = %e,
                    "Failed to load history, continuing without it"
                );
                Vec::new()
            }
        };

        let selection = self
            .selector
            .select(&request.text, &history, &self.candidates())
            .await;
        let agent = self.resolve(&selection.agent_name);

        tracing::info!(
            session = %key,
            agent = agent.name(),
            confidence = selection.classification.as_ref().map(|c| c.confidence),
            fallback = selection.fallback.map(FallbackReason::as_str),
            "Routing request"
        );

        let outcome = agent
            .process_request(&request.text, &request.user_id, &request.session_id, &history)
            .await;

        match outcome {
            Ok(reply) => Turn {
                agent_name: agent.name().to_string(),
                reply,
                fallback_reason: selection.fallback,
            },
            Err(e) if agent.name() != self.fallback.name() => {
                tracing::warn!(
                    session = %key,
                    agent = agent.name(),
                    error = %e,
                    "Agent failed, rerouting to fallback agent"
                );
                let reply = match self
                    .fallback
                    .process_request(&request.text, &request.user_id, &request.session_id, &history)
                    .await
                {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::error!(session = %key, error = %e, "Fallback agent failed");
                        AgentReply::text(UNAVAILABLE_MESSAGE)
                    }
                };
                Turn {
                    agent_name: self.fallback.name().to_string(),
                    reply,
                    fallback_reason: Some(FallbackReason::AgentError),
                }
            }
            Err(e) => {
                tracing::error!(session = %key, error = %e, "Fallback agent failed");
                Turn {
                    agent_name: self.fallback.name().to_string(),
                    reply: AgentReply::text(UNAVAILABLE_MESSAGE),
                    fallback_reason: selection.fallback.or(Some(FallbackReason::AgentError)),
                }
            }
        }
    }

    /// Append the user message and the reply as one unit, then build the
    /// response.
    async fn commit(
        &self,
        request: &InboundRequest,
        key: &SessionKey,
        turn: Turn,
    ) -> RouteResponse {
        let output = turn.reply.output();
        let tool_calls_made = turn.reply.tool_calls_made;

        if let Err(e) = self
            .store
            .append(key, vec![Message::user(&request.text), turn.reply.message])
            .await
        {
            tracing::error!(session = %key, error = %e, "Failed to append turn to history");
        }

        if let Some(reason) = turn.fallback_reason {
            self.metrics.record_fallback(reason.as_str());
        }
        if turn.reply.tool_loop_exceeded {
            self.metrics.record_tool_loop_exceeded();
        }
        self.metrics.record_route(&turn.agent_name, tool_calls_made);

        RouteResponse {
            output,
            metadata: RouteMetadata {
                agent_name: turn.agent_name,
                tool_calls_made,
                fallback_reason: turn.fallback_reason,
            },
        }
    }

    fn observe_cancel(&self, key: &SessionKey) {
        self.metrics.record_cancelled();
        tracing::info!(session = %key, "Request cancelled, turn not recorded");
    }
}

#[async_trait]
impl Router for Orchestrator {
    async fn route_request(&self, request: &InboundRequest) -> RouteResponse {
        let key = SessionKey::new(&request.user_id, &request.session_id);
        let turn = self.run_turn(request, &key).await;
        self.commit(request, &key, turn).await
    }

    async fn route_request_with_cancel(
        &self,
        request: &InboundRequest,
        cancel: CancellationToken,
    ) -> Option<RouteResponse> {
        let key = SessionKey::new(&request.user_id, &request.session_id);
        if cancel.is_cancelled() {
            self.observe_cancel(&key);
            return None;
        }

        let turn = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.observe_cancel(&key);
                return None;
            }
            turn = self.run_turn(request, &key) => turn,
        };

        if cancel.is_cancelled() {
            self.observe_cancel(&key);
            return None;
        }
        Some(self.commit(request, &key, turn).await)
    }

    fn agents(&self) -> Vec<AgentDescriptor> {
        let mut descriptors = self.registry.descriptors();
        if self.registry.get(self.fallback.name()).is_none() {
            descriptors.push(self.fallback.descriptor().clone());
        }
        descriptors
    }

    fn render_metrics(&self) -> String {
        self.metrics.render().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to render metrics");
            String::new()
        })
    }
}
