//! Agent selection: a classifier strategy plus the fallback policy around it.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Write;
use std::sync::Arc;

use super::traits::AgentDescriptor;
use crate::providers::{ChatRequest, Provider, ToolChoice};
use crate::sessions::{ContentBlock, Message, Role};
use crate::tools::ToolSpec;

pub const CLASSIFIER_TOOL: &str = "analyze_prompt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub selected_agent: String,
    /// Normalized to `0.0..=1.0`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Picks the agent best suited to a turn. Must not mutate history or agent
/// state.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        input: &str,
        history: &[Message],
        agents: &[AgentDescriptor],
    ) -> Result<ClassificationResult>;

    /// The name of this classifier implementation.
    fn name(&self) -> &str;
}

// ── Model-backed classifier ─────────────────────────────────────

/// Asks the model to call a forced `analyze_prompt` tool naming one of the
/// candidate agents.
pub struct LlmClassifier {
    provider: Arc<dyn Provider>,
    model: String,
    history_window: usize,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn Provider>, model: &str, history_window: usize) -> Self {
        Self {
            provider,
            model: model.to_string(),
            history_window,
        }
    }

    fn tool_spec(agents: &[AgentDescriptor]) -> ToolSpec {
        let names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();
        ToolSpec {
            name: CLASSIFIER_TOOL.to_string(),
            description: "Select the agent best suited to handle the user's request".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "selected_agent": {
                        "type": "string",
                        "enum": names,
                        "description": "Exact name of the chosen agent"
                    },
                    "confidence": {
                        "type": "number",
                        "description": "Confidence in the choice, between 0 and 1"
                    },
                    "rationale": {
                        "type": "string",
                        "description": "One sentence explaining the choice"
                    }
                },
                "required": ["selected_agent", "confidence"]
            }),
        }
    }

    fn system_prompt(agents: &[AgentDescriptor]) -> String {
        let mut prompt = String::from(
            "You route customer requests to the most appropriate agent. \
             Consider the conversation so far: follow-up messages usually belong to \
             the agent that handled the previous turn.\n\nAgents:\n",
        );
        for agent in agents {
            let capabilities = agent
                .capabilities
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(prompt, "- {}: {} [{capabilities}]", agent.name, agent.description);
        }
        let _ = write!(
            prompt,
            "\nCall the {CLASSIFIER_TOOL} tool with the exact agent name and your confidence."
        );
        prompt
    }

    fn user_prompt(&self, input: &str, history: &[Message]) -> String {
        let start = history.len().saturating_sub(self.history_window);
        let mut prompt = String::new();
        let recent = &history[start..];
        if !recent.is_empty() {
            prompt.push_str("Conversation so far:\n");
            for message in recent {
                let text = message.text();
                if text.is_empty() {
                    continue;
                }
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                let _ = writeln!(prompt, "{role}: {text}");
            }
            prompt.push('\n');
        }
        let _ = write!(prompt, "Current request: {input}");
        prompt
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        input: &str,
        history: &[Message],
        agents: &[AgentDescriptor],
    ) -> Result<ClassificationResult> {
        if agents.is_empty() {
            bail!("no agents to classify against");
        }

        let messages = vec![Message::user(self.user_prompt(input, history))];
        let request = ChatRequest::new(&self.model, 0.0, messages)
            .with_system_prompt(Self::system_prompt(agents))
            .with_tools(vec![Self::tool_spec(agents)])
            .with_tool_choice(ToolChoice::Tool(CLASSIFIER_TOOL.to_string()));

        let response = self.provider.chat(&request).await?;

        let payload = response
            .content
            .iter()
            .find_map(|block| match block {
                ContentBlock::ToolUse { name, input, .. }
                    if name == CLASSIFIER_TOOL =>
                {
                    Some(input.clone())
                }
                _ => None,
            })
            .or_else(|| extract_json_object(&response.text_content()))
            .ok_or_else(|| anyhow!("classifier response carried no selection"))?;

        parse_selection(&payload, agents)
    }

    fn name(&self) -> &str {
        "llm"
    }
}

/// First JSON object embedded in `text`; trailing prose or further objects
/// are ignored.
fn extract_json_object(text: &str) -> Option<Value> {
    text.match_indices('{').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<Value>()
            .next()
            .and_then(Result::ok)
            .filter(Value::is_object)
    })
}

fn parse_selection(payload: &Value, agents: &[AgentDescriptor]) -> Result<ClassificationResult> {
    let raw_name = payload
        .get("selected_agent")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("classifier selection is missing selected_agent"))?;

    // Canonicalize to the registered spelling; unknown names pass through so
    // the selector can record them as such.
    let selected_agent = agents
        .iter()
        .find(|a| a.name.eq_ignore_ascii_case(raw_name))
        .map_or_else(|| raw_name.to_string(), |a| a.name.clone());

    let confidence = payload.get("confidence").map_or(0.0, parse_confidence);
    let rationale = payload
        .get("rationale")
        .and_then(Value::as_str)
        .map(ToString::to_string);

    Ok(ClassificationResult {
        selected_agent,
        confidence,
        rationale,
    })
}

/// Numeric confidences are clamped to `0..=1`; ordinal ones map to fixed
/// points.
fn parse_confidence(value: &Value) -> f64 {
    if let Some(n) = value.as_f64() {
        return if n.is_finite() { n.clamp(0.0, 1.0) } else { 0.0 };
    }
    match value.as_str().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("high") => 0.9,
        Some("medium") => 0.6,
        Some("low") => 0.3,
        Some(other) => other.parse::<f64>().map_or(0.0, |n| n.clamp(0.0, 1.0)),
        None => 0.0,
    }
}

// ── Fallback policy ─────────────────────────────────────────────

/// Why the fallback agent was chosen instead of the classifier's pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    EmptyRegistry,
    ClassifierError,
    LowConfidence,
    UnknownAgent,
    AgentError,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyRegistry => "empty_registry",
            Self::ClassifierError => "classifier_error",
            Self::LowConfidence => "low_confidence",
            Self::UnknownAgent => "unknown_agent",
            Self::AgentError => "agent_error",
        }
    }
}

/// Outcome of agent selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub agent_name: String,
    pub classification: Option<ClassificationResult>,
    pub fallback: Option<FallbackReason>,
}

/// Wraps a [`Classifier`] with the threshold, unknown-label and
/// empty-registry fallbacks. Never fails.
pub struct AgentSelector {
    classifier: Arc<dyn Classifier>,
    confidence_threshold: f64,
    fallback_agent: String,
}

impl AgentSelector {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        confidence_threshold: f64,
        fallback_agent: &str,
    ) -> Self {
        Self {
            classifier,
            confidence_threshold: confidence_threshold.clamp(0.0, 1.0),
            fallback_agent: fallback_agent.to_string(),
        }
    }

    pub fn fallback_agent(&self) -> &str {
        &self.fallback_agent
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    fn fallback(
        &self,
        reason: FallbackReason,
        classification: Option<ClassificationResult>,
    ) -> Selection {
        Selection {
            agent_name: self.fallback_agent.clone(),
            classification,
            fallback: Some(reason),
        }
    }

    pub async fn select(
        &self,
        input: &str,
        history: &[Message],
        agents: &[AgentDescriptor],
    ) -> Selection {
        if agents.is_empty() {
            return self.fallback(FallbackReason::EmptyRegistry, None);
        }

        let result = match self.classifier.classify(input, history, agents).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    classifier = self.classifier.name(),
                    error = %e,
                    "Classification failed, using fallback agent"
                );
                return self.fallback(FallbackReason::ClassifierError, None);
            }
        };

        if !agents.iter().any(|a| a.name == result.selected_agent) {
            tracing::warn!(
                label = %result.selected_agent,
                "Classifier chose an unregistered agent, using fallback agent"
            );
            return self.fallback(FallbackReason::UnknownAgent, Some(result));
        }

        if result.confidence < self.confidence_threshold {
            tracing::info!(
                label = %result.selected_agent,
                confidence = result.confidence,
                threshold = self.confidence_threshold,
                "Classifier confidence below threshold, using fallback agent"
            );
            return self.fallback(FallbackReason::LowConfidence, Some(result));
        }

        Selection {
            agent_name: result.selected_agent.clone(),
            classification: Some(result),
            fallback: None,
        }
    }
}
