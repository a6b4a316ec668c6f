//! Wires configuration into a ready-to-serve [`Orchestrator`].

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{
    Agent, AgentSelector, ChainAgent, GenerativeAgent, HumanAgent, LlmClassifier, LogHandoff,
    ToolAgent, VerifyPolicy,
};
use crate::config::{expand_path, Config};
use crate::providers::{create_resilient_provider, Provider};
use crate::retrieval::InMemoryRetriever;
use crate::routing::{AgentRegistry, Orchestrator};
use crate::sessions::create_conversation_store;
use crate::tools::{order_management_registry, InMemoryRecords};

pub const ORDER_AGENT: &str = "Order Management Agent";
pub const PRODUCT_AGENT: &str = "Product Information Agent";
pub const CUSTOMER_SERVICE_AGENT: &str = "Customer Service Agent";
pub const VERIFIED_CHAIN_AGENT: &str = "AI with Human Verification Agent";

const PRODUCT_COLLECTION: &str = "products";
const SUPPORT_COLLECTION: &str = "customer-service";
const RETRIEVAL_TOP_K: usize = 3;
const CHAIN_STEP_SLACK: Duration = Duration::from_secs(1);

const ORDER_PROMPT: &str = "You are an order management assistant. Use the available tools \
to look up orders, track shipments and start returns. Never invent order details; if a tool \
reports that a record does not exist, tell the customer.";
const PRODUCT_PROMPT: &str = "You answer questions about product specifications, \
compatibility, pricing and availability. Base your answer on the provided context.";
const SUPPORT_PROMPT: &str = "You are a friendly customer service assistant handling general \
inquiries and account questions.";

/// Build the orchestrator using the provider named in `config`.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let provider = create_resilient_provider(
        config.provider_name(),
        config.api_key.as_deref(),
        config.api_url.as_deref(),
        config.reliability.to_retry_policy(),
    )
    .context("Failed to create model provider")?;
    build_with_provider(config, provider)
}

/// Build the orchestrator around an already constructed provider.
pub fn build_with_provider(config: &Config, provider: Arc<dyn Provider>) -> Result<Orchestrator> {
    let model = config.model();
    let temperature = config.default_temperature;

    let orders = Arc::new(load_records(
        config.data.orders_path.as_deref(),
        InMemoryRecords::sample_orders,
    )?);
    let shipments = Arc::new(load_records(
        config.data.shipments_path.as_deref(),
        InMemoryRecords::sample_shipments,
    )?);
    let products = load_records(
        config.data.products_path.as_deref(),
        InMemoryRecords::sample_products,
    )?;

    let tools = order_management_registry(orders, shipments)?;
    let order_agent = ToolAgent::new(
        ORDER_AGENT,
        "Handles order-related inquiries including order status, shipment tracking, returns, \
         and refunds. Uses order database and shipment tracking tools.",
        provider.clone(),
        model,
        Arc::new(tools),
    )
    .with_system_prompt(ORDER_PROMPT)
    .with_temperature(temperature)
    .with_loop_config(config.tool_loop.to_loop_config());

    let product_agent = GenerativeAgent::new(
        PRODUCT_AGENT,
        "Provides detailed product information, answers questions about specifications, \
         compatibility, and availability.",
        provider.clone(),
        model,
    )
    .with_system_prompt(PRODUCT_PROMPT)
    .with_temperature(temperature)
    .with_retriever(
        Arc::new(InMemoryRetriever::from_products(
            PRODUCT_COLLECTION,
            &products,
            RETRIEVAL_TOP_K,
        )),
        PRODUCT_COLLECTION,
    );

    let mut support_agent = GenerativeAgent::new(
        CUSTOMER_SERVICE_AGENT,
        "Handles general customer inquiries, account-related questions, and non-technical \
         support requests.",
        provider.clone(),
        model,
    )
    .with_system_prompt(SUPPORT_PROMPT)
    .with_temperature(temperature);
    if let Some(path) = config.data.knowledge_path.as_deref() {
        let knowledge = InMemoryRetriever::from_json_file(&expand_path(path), RETRIEVAL_TOP_K)?;
        support_agent = support_agent.with_retriever(Arc::new(knowledge), SUPPORT_COLLECTION);
    }
    let support_agent: Arc<dyn Agent> = Arc::new(support_agent);

    let fallback_name = config.classifier.fallback_agent.as_str();
    let human: Arc<dyn Agent> = Arc::new(
        HumanAgent::new(
            fallback_name,
            "Handles complex inquiries, complaints, or sensitive issues requiring human \
             expertise.",
            Arc::new(LogHandoff),
        )
        .with_acknowledgement(config.escalation.acknowledgement.clone()),
    );

    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(order_agent))?;
    registry.register(Arc::new(product_agent))?;
    registry.register(support_agent.clone())?;

    if config.escalation.verified_chain {
        let verifier: Arc<dyn Agent> = Arc::new(
            HumanAgent::new(
                "Human Verifier",
                "Verifies and potentially modifies AI-generated responses",
                Arc::new(LogHandoff),
            )
            .with_acknowledgement(config.escalation.acknowledgement.clone()),
        );
        let chain = ChainAgent::new(
            VERIFIED_CHAIN_AGENT,
            "Handles high-priority or sensitive customer inquiries by generating AI responses \
             and having them verified by a human before sending.",
            vec![support_agent],
        )?
        .with_verifier(verifier, VerifyPolicy::Always)
        .with_step_timeout(chain_step_timeout(config));
        registry.register(Arc::new(chain))?;
    }

    let classifier = LlmClassifier::new(provider, model, config.classifier.history_window);
    let selector = AgentSelector::new(
        Arc::new(classifier),
        config.classifier.confidence_threshold,
        fallback_name,
    );

    tracing::info!(
        agents = registry.len() + 1,
        fallback = fallback_name,
        model,
        "orchestrator ready"
    );

    Ok(Orchestrator::new(Arc::from(create_conversation_store()), registry, human, selector)?
        .with_history_policy(config.history.to_policy()))
}

/// Covers the provider's full retry envelope for the step's model call.
fn chain_step_timeout(config: &Config) -> Duration {
    config
        .reliability
        .to_retry_policy()
        .max_total_duration()
        .saturating_add(CHAIN_STEP_SLACK)
}

fn load_records(path: Option<&str>, sample: fn() -> InMemoryRecords) -> Result<InMemoryRecords> {
    match path {
        Some(path) => InMemoryRecords::from_json_file(&expand_path(path)),
        None => Ok(sample()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::CLASSIFIER_TOOL;
    use crate::providers::{ProviderError, ReliableProvider};
    use crate::routing::{InboundRequest, Router};
    use crate::test_support::{tool_use, ScriptedProvider};
    use serde_json::json;

    fn names(orchestrator: &Orchestrator) -> Vec<String> {
        orchestrator.agents().into_iter().map(|d| d.name).collect()
    }

    #[test]
    fn default_config_registers_the_support_agents() {
        let orchestrator =
            build_with_provider(&Config::default(), Arc::new(ScriptedProvider::new())).unwrap();
        let names = names(&orchestrator);
        for expected in [ORDER_AGENT, PRODUCT_AGENT, CUSTOMER_SERVICE_AGENT, "Human Agent"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert!(!names.iter().any(|n| n == VERIFIED_CHAIN_AGENT));
        assert_eq!(orchestrator.fallback_agent(), "Human Agent");
    }

    #[test]
    fn verified_chain_is_opt_in() {
        let mut config = Config::default();
        config.escalation.verified_chain = true;
        let orchestrator =
            build_with_provider(&config, Arc::new(ScriptedProvider::new())).unwrap();
        assert!(names(&orchestrator).iter().any(|n| n == VERIFIED_CHAIN_AGENT));
    }

    #[test]
    fn data_files_replace_sample_tables() {
        let dir = tempfile::tempdir().unwrap();
        let orders = dir.path().join("orders.json");
        std::fs::write(&orders, r#"{"A-1": {"status": "Delivered"}}"#).unwrap();

        let mut config = Config::default();
        config.data.orders_path = Some(orders.display().to_string());
        assert!(build_with_provider(&config, Arc::new(ScriptedProvider::new())).is_ok());

        config.data.orders_path = Some(dir.path().join("missing.json").display().to_string());
        assert!(build_with_provider(&config, Arc::new(ScriptedProvider::new())).is_err());
    }

    #[tokio::test]
    async fn routes_order_question_through_tools() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_blocks(vec![tool_use(
            "c1",
            CLASSIFIER_TOOL,
            json!({"selected_agent": ORDER_AGENT, "confidence": 0.95}),
        )]);
        provider.push_blocks(vec![tool_use("t1", "OrderLookup", json!({"orderId": "12345"}))]);
        provider.push_text("Order 12345 has shipped.");

        let orchestrator = build_with_provider(&Config::default(), provider.clone()).unwrap();
        let response = orchestrator
            .route_request(&InboundRequest::new("Where is order 12345?", "u", "s"))
            .await;

        assert_eq!(response.metadata.agent_name, ORDER_AGENT);
        assert_eq!(response.metadata.tool_calls_made, 1);
        assert_eq!(response.output, "Order 12345 has shipped.");
        assert_eq!(provider.call_count(), 3);
    }

    #[test]
    fn chain_step_timeout_spans_all_retries() {
        let mut config = Config::default();
        config.reliability.request_timeout_secs = 1;
        config.reliability.max_retries = 2;
        assert!(chain_step_timeout(&config) > Duration::from_secs(3));
    }

    #[tokio::test]
    async fn verified_chain_survives_a_retried_model_call() {
        let mut config = Config::default();
        config.escalation.verified_chain = true;
        config.reliability.request_timeout_secs = 1;
        config.reliability.max_retries = 2;
        config.reliability.initial_backoff_ms = 1;
        config.reliability.max_backoff_ms = 2;

        let scripted = Arc::new(ScriptedProvider::new().with_delay(Duration::from_millis(600)));
        scripted.push_blocks(vec![tool_use(
            "c1",
            CLASSIFIER_TOOL,
            json!({"selected_agent": VERIFIED_CHAIN_AGENT, "confidence": 0.95}),
        )]);
        scripted.push_error(ProviderError::Transient("502".into()));
        scripted.push_text("Here is a drafted answer.");
        let provider = Arc::new(ReliableProvider::new(
            scripted.clone(),
            config.reliability.to_retry_policy(),
        ));

        let orchestrator = build_with_provider(&config, provider).unwrap();
        let response = orchestrator
            .route_request(&InboundRequest::new("I want to complain", "u", "s"))
            .await;

        assert_eq!(response.metadata.agent_name, VERIFIED_CHAIN_AGENT);
        assert!(response.metadata.fallback_reason.is_none());
        assert_eq!(response.output, config.escalation.acknowledgement);
        assert_eq!(scripted.call_count(), 3);
    }
}
