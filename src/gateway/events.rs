//! Ingestion and delivery envelopes at the gateway boundary.
//!
//! Inbound documents arrive as `document-created` CloudEvents whose text has
//! already been extracted upstream; replies leave as [`ReplyEnvelope`]s.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::{InboundRequest, RouteResponse};

pub const DOCUMENT_CREATED: &str = "document-created";
const ANONYMOUS_USER: &str = "anonymous";
const DEFAULT_SUBJECT: &str = "Your request";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("unsupported event type '{0}', expected '{DOCUMENT_CREATED}'")]
    UnsupportedType(String),
    #[error("event {0} carries no document text")]
    MissingText(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEvent {
    #[serde(default)]
    pub specversion: Option<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub time: Option<String>,
    pub data: DocumentEventData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEventData {
    /// Correlation key shared by every document derived from one source.
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub document: Option<DocumentRef>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    /// Plain text extracted by the ingestion pipeline.
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub url: String,
    #[serde(default, rename = "type")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl DocumentEvent {
    /// Session is the chain ID (falling back to the event ID); the user is the
    /// first author.
    pub fn to_inbound(&self) -> Result<InboundRequest, EventError> {
        if self.event_type != DOCUMENT_CREATED {
            return Err(EventError::UnsupportedType(self.event_type.clone()));
        }
        let text = self
            .data
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| EventError::MissingText(self.id.clone()))?;

        let session_id = self.data.chain_id.as_deref().unwrap_or(&self.id);
        let user_id = self
            .data
            .metadata
            .authors
            .first()
            .map_or(ANONYMOUS_USER, String::as_str);

        Ok(InboundRequest::new(text, user_id, session_id))
    }

    pub fn subject(&self) -> &str {
        self.data
            .metadata
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_SUBJECT)
    }
}

/// Reply handed to the delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    pub subject: String,
    pub text: String,
    pub handling_agent: String,
}

impl ReplyEnvelope {
    pub fn reply_to(subject: &str, response: &RouteResponse) -> Self {
        let subject = subject.trim();
        let subject = if subject.is_empty() { DEFAULT_SUBJECT } else { subject };
        let subject = if subject.to_ascii_lowercase().starts_with("re:") {
            subject.to_string()
        } else {
            format!("Re: {subject}")
        };
        Self {
            subject,
            text: response.output.clone(),
            handling_agent: response.metadata.agent_name.clone(),
        }
    }
}
