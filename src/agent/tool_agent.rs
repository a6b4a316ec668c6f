//! Model-backed agent that can call tools through the bounded tool loop.

use async_trait::async_trait;
use std::sync::Arc;

use super::traits::{Agent, AgentDescriptor, AgentError, AgentReply, Capability};
use crate::providers::{ChatRequest, Provider};
use crate::sessions::Message;
use crate::tools::{run_tool_loop, ToolExecutor, ToolLoopConfig, ToolLoopOutcome};

pub const DEFAULT_LOOP_FALLBACK: &str =
    "I'm sorry, I wasn't able to complete your request. Please try again or contact our support team.";

pub struct ToolAgent {
    descriptor: AgentDescriptor,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    system_prompt: Option<String>,
    executor: Arc<dyn ToolExecutor>,
    loop_config: ToolLoopConfig,
    fallback_message: String,
}

impl ToolAgent {
    pub fn new(
        name: &str,
        description: &str,
        provider: Arc<dyn Provider>,
        model: &str,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            descriptor: AgentDescriptor::new(
                name,
                description,
                [Capability::GeneratesText, Capability::UsesTools],
            ),
            provider,
            model: model.to_string(),
            temperature: 0.2,
            system_prompt: None,
            executor,
            loop_config: ToolLoopConfig::default(),
            fallback_message: DEFAULT_LOOP_FALLBACK.to_string(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_loop_config(mut self, config: ToolLoopConfig) -> Self {
        self.loop_config = config;
        self
    }

    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }
}

#[async_trait]
impl Agent for ToolAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn process_request(
        &self,
        input: &str,
        _user_id: &str,
        session_id: &str,
        history: &[Message],
    ) -> Result<AgentReply, AgentError> {
        let mut messages = history.to_vec();
        messages.push(Message::user(input));

        let mut request = ChatRequest::new(&self.model, self.temperature, messages);
        request.system_prompt = self.system_prompt.clone();

        let outcome = run_tool_loop(
            self.provider.as_ref(),
            request,
            Arc::clone(&self.executor),
            &self.loop_config,
        )
        .await;

        match outcome {
            ToolLoopOutcome::Resolved {
                text,
                tool_calls_made,
            } => Ok(AgentReply {
                message: Message::assistant(text),
                tool_calls_made,
                tool_loop_exceeded: false,
            }),
            ToolLoopOutcome::BudgetExceeded {
                partial,
                tool_calls_made,
            } => {
                tracing::warn!(
                    agent = %self.descriptor.name,
                    session_id,
                    tool_calls_made,
                    max_recursions = self.loop_config.max_recursions,
                    "Tool loop exceeded its recursion budget"
                );
                let text = partial.unwrap_or_else(|| self.fallback_message.clone());
                Ok(AgentReply {
                    message: Message::assistant(text),
                    tool_calls_made,
                    tool_loop_exceeded: true,
                })
            }
            ToolLoopOutcome::ModelFailed {
                error,
                tool_calls_made,
            } => {
                tracing::warn!(
                    agent = %self.descriptor.name,
                    session_id,
                    tool_calls_made,
                    error = %error,
                    "Model failed during tool loop"
                );
                Err(AgentError::ServiceUnavailable {
                    agent: self.descriptor.name.clone(),
                    reason: error.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::sessions::ContentBlock;
    use crate::test_support::{tool_use, ScriptedProvider};
    use crate::tools::{order_management_registry, InMemoryRecords};
    use serde_json::json;
    use std::time::Duration;

    fn agent(provider: Arc<ScriptedProvider>) -> ToolAgent {
        let orders = Arc::new(InMemoryRecords::sample_orders());
        let shipments = Arc::new(InMemoryRecords::sample_shipments());
        let registry = order_management_registry(orders, shipments).unwrap();
        ToolAgent::new(
            "Order Management Agent",
            "Handles orders",
            provider,
            "m",
            Arc::new(registry),
        )
        .with_loop_config(ToolLoopConfig {
            max_recursions: 5,
            tool_timeout: Duration::from_secs(1),
        })
    }

    fn last_tool_result(provider: &ScriptedProvider) -> (serde_json::Value, bool) {
        let requests = provider.requests();
        let last = requests.last().unwrap().messages.last().unwrap();
        match &last.content[0] {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => (content.clone(), *is_error),
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn known_order_resolves_with_one_tool_call() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_blocks(vec![tool_use("tu-1", "OrderLookup", json!({"orderId": "12345"}))]);
        provider.push_text("Your order 12345 has shipped.");

        let reply = agent(provider.clone())
            .process_request("Where is my order 12345?", "u", "s", &[])
            .await
            .unwrap();

        assert_eq!(reply.tool_calls_made, 1);
        assert!(!reply.tool_loop_exceeded);
        assert_eq!(reply.output(), "Your order 12345 has shipped.");
        let (content, is_error) = last_tool_result(&provider);
        assert!(!is_error);
        assert_eq!(content["order"]["status"], "Shipped");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn unknown_order_yields_error_result_then_apology() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_blocks(vec![tool_use("tu-1", "OrderLookup", json!({"orderId": "99999"}))]);
        provider.push_text("Sorry, I couldn't find order 99999.");

        let reply = agent(provider.clone())
            .process_request("Where is my order 99999?", "u", "s", &[])
            .await
            .unwrap();

        assert_eq!(reply.tool_calls_made, 1);
        assert_eq!(reply.output(), "Sorry, I couldn't find order 99999.");
        let (content, is_error) = last_tool_result(&provider);
        assert!(is_error);
        assert_eq!(content, json!("No order found with ID 99999"));
    }

    #[tokio::test]
    async fn exhausted_budget_returns_fallback_text() {
        let provider = Arc::new(ScriptedProvider::new());
        for i in 0..6 {
            provider.push_blocks(vec![tool_use(
                &format!("tu-{i}"),
                "ShipmentTracker",
                json!({"orderId": "12345"}),
            )]);
        }

        let reply = agent(provider.clone())
            .process_request("track it forever", "u", "s", &[])
            .await
            .unwrap();

        assert!(reply.tool_loop_exceeded);
        assert_eq!(reply.tool_calls_made, 5);
        assert_eq!(reply.output(), DEFAULT_LOOP_FALLBACK);
        assert_eq!(provider.call_count(), 6);
    }

    #[tokio::test]
    async fn model_outage_surfaces_service_unavailable() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error(ProviderError::Unavailable {
            attempts: 3,
            last: "503".into(),
        });

        let err = agent(provider)
            .process_request("Where is my order?", "u", "s", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ServiceUnavailable { .. }));
    }
}
