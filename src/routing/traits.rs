//! Routing request/response types and the router contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentDescriptor, FallbackReason};

/// A normalized inbound customer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    pub text: String,
    pub user_id: String,
    pub session_id: String,
}

impl InboundRequest {
    pub fn new(text: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            text: text.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMetadata {
    pub agent_name: String,
    pub tool_calls_made: u32,
    /// Present when the fallback agent handled the turn in place of the
    /// classifier's choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub output: String,
    pub metadata: RouteMetadata,
}

/// Routes one request to one agent and records the turn.
#[async_trait]
pub trait Router: Send + Sync {
    /// Always produces a response; recoverable failures are absorbed by the
    /// fallback agent.
    async fn route_request(&self, request: &InboundRequest) -> RouteResponse;

    /// Like [`Router::route_request`], but returns `None` without touching
    /// history once `cancel` fires.
    async fn route_request_with_cancel(
        &self,
        request: &InboundRequest,
        cancel: CancellationToken,
    ) -> Option<RouteResponse>;

    /// Descriptors of every agent a request can be routed to.
    fn agents(&self) -> Vec<AgentDescriptor>;

    /// Prometheus text exposition of routing counters.
    fn render_metrics(&self) -> String;
}
