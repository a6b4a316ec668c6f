//! Scripted collaborators shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::agent::{
    Agent, AgentDescriptor, AgentError, AgentReply, Capability, ClassificationResult, Classifier,
};
use crate::providers::{ChatRequest, ChatResponse, Provider, ProviderError};
use crate::sessions::{ContentBlock, Message};

pub fn tool_use(id: &str, name: &str, input: Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

/// Provider that replays queued responses in order and records every request.
/// An exhausted script answers with a transient error.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_response(&self, response: Result<ChatResponse, ProviderError>) {
        self.script.lock().push_back(response);
    }

    pub fn push_text(&self, text: &str) {
        self.push_response(Ok(ChatResponse::text(text)));
    }

    pub fn push_blocks(&self, content: Vec<ContentBlock>) {
        self.push_response(Ok(ChatResponse { content }));
    }

    pub fn push_error(&self, error: ProviderError) {
        self.push_response(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let next = self.script.lock().pop_front();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next.unwrap_or_else(|| Err(ProviderError::Transient("script exhausted".into())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Classifier that always returns the same selection, or always fails.
pub struct FixedClassifier {
    result: Option<ClassificationResult>,
    calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(agent: &str, confidence: f64) -> Self {
        Self {
            result: Some(ClassificationResult {
                selected_agent: agent.to_string(),
                confidence,
                rationale: None,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(
        &self,
        _input: &str,
        _history: &[Message],
        _agents: &[AgentDescriptor],
    ) -> anyhow::Result<ClassificationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .ok_or_else(|| anyhow::anyhow!("classifier model offline"))
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Agent that echoes its input after an optional delay, recording the
/// history it was handed.
pub struct EchoAgent {
    descriptor: AgentDescriptor,
    delay: Option<Duration>,
    fail: bool,
    seen_history: Mutex<Vec<usize>>,
}

impl EchoAgent {
    pub fn new(name: &str) -> Self {
        Self {
            descriptor: AgentDescriptor::new(
                name,
                "echoes the request",
                [Capability::GeneratesText],
            ),
            delay: None,
            fail: false,
            seen_history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// History lengths seen by each call.
    pub fn seen_history(&self) -> Vec<usize> {
        self.seen_history.lock().clone()
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn process_request(
        &self,
        input: &str,
        _user_id: &str,
        _session_id: &str,
        history: &[Message],
    ) -> Result<AgentReply, AgentError> {
        self.seen_history.lock().push(history.len());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AgentError::ServiceUnavailable {
                agent: self.descriptor.name.clone(),
                reason: "echo failure".into(),
            });
        }
        Ok(AgentReply::text(format!("{}: {input}", self.descriptor.name)))
    }
}
