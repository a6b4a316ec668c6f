//! Model-backed agent, optionally retrieval-augmented.

use async_trait::async_trait;
use std::fmt::Write;
use std::sync::Arc;

use super::traits::{Agent, AgentDescriptor, AgentError, AgentReply, Capability};
use crate::providers::{ChatRequest, Provider};
use crate::retrieval::Retriever;
use crate::sessions::Message;

struct RetrievalSource {
    retriever: Arc<dyn Retriever>,
    collection_id: String,
}

/// Forwards the request plus history to the model and returns its text.
///
/// With a retriever attached, the top documents for the request are added to
/// the system prompt before generation. A failed retrieval degrades to plain
/// generation.
pub struct GenerativeAgent {
    descriptor: AgentDescriptor,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    system_prompt: Option<String>,
    retrieval: Option<RetrievalSource>,
}

impl GenerativeAgent {
    pub fn new(
        name: &str,
        description: &str,
        provider: Arc<dyn Provider>,
        model: &str,
    ) -> Self {
        Self {
            descriptor: AgentDescriptor::new(name, description, [Capability::GeneratesText]),
            provider,
            model: model.to_string(),
            temperature: 0.2,
            system_prompt: None,
            retrieval: None,
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

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>, collection_id: &str) -> Self {
        self.descriptor
            .capabilities
            .insert(Capability::RetrievesKnowledge);
        self.retrieval = Some(RetrievalSource {
            retriever,
            collection_id: collection_id.to_string(),
        });
        self
    }

    async fn build_system_prompt(&self, input: &str) -> Option<String> {
        let Some(source) = &self.retrieval else {
            return self.system_prompt.clone();
        };

        let documents = match source.retriever.query(input, &source.collection_id).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(
                    agent = %self.descriptor.name,
                    retriever = source.retriever.name(),
                    error = %e,
                    "Retrieval failed, generating without context"
                );
                Vec::new()
            }
        };
        if documents.is_empty() {
            return self.system_prompt.clone();
        }

        let mut prompt = self.system_prompt.clone().unwrap_or_default();
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str("Relevant context:\n");
        for doc in &documents {
            let _ = writeln!(prompt, "- {}", doc.content);
        }
        Some(prompt)
    }
}

#[async_trait]
impl Agent for GenerativeAgent {
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
        request.system_prompt = self.build_system_prompt(input).await;

        let response = self.provider.chat(&request).await.map_err(|e| {
            AgentError::ServiceUnavailable {
                agent: self.descriptor.name.clone(),
                reason: e.to_string(),
            }
        })?;

        tracing::debug!(agent = %self.descriptor.name, session_id, "Generated reply");
        Ok(AgentReply::text(response.text_content()))
    }
}
