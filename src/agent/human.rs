//! Human escalation: a fixed acknowledgement plus an asynchronous handoff.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::traits::{Agent, AgentDescriptor, AgentError, AgentReply, Capability};
use crate::sessions::Message;

pub const DEFAULT_ACKNOWLEDGEMENT: &str = "Your request has been received and will be processed by our customer service team. We'll get back to you as soon as possible.";

/// A request handed to the human-facing channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffTicket {
    pub ticket_id: Uuid,
    pub session_id: String,
    pub user_id: String,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

impl HandoffTicket {
    pub fn new(user_id: &str, session_id: &str, raw_text: &str) -> Self {
        Self {
            ticket_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            raw_text: raw_text.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Human-facing channel. Fire-and-forget from the router's perspective.
#[async_trait]
pub trait HumanHandoff: Send + Sync {
    async fn notify(&self, ticket: HandoffTicket) -> Result<()>;

    /// The name of this handoff channel.
    fn name(&self) -> &str;
}

/// Writes each ticket as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandoff;

#[async_trait]
impl HumanHandoff for LogHandoff {
    async fn notify(&self, ticket: HandoffTicket) -> Result<()> {
        tracing::info!(
            ticket_id = %ticket.ticket_id,
            user_id = %ticket.user_id,
            session_id = %ticket.session_id,
            text = %ticket.raw_text,
            "Escalated request to human queue"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Pushes tickets onto a bounded queue drained by a human-facing worker.
#[derive(Debug, Clone)]
pub struct QueueHandoff {
    tx: mpsc::Sender<HandoffTicket>,
}

impl QueueHandoff {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<HandoffTicket>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl HumanHandoff for QueueHandoff {
    async fn notify(&self, ticket: HandoffTicket) -> Result<()> {
        self.tx
            .send(ticket)
            .await
            .context("Human handoff queue is closed")
    }

    fn name(&self) -> &str {
        "queue"
    }
}

/// Acknowledges immediately and hands the raw request to a human. Never calls
/// a model.
pub struct HumanAgent {
    descriptor: AgentDescriptor,
    acknowledgement: String,
    handoff: Arc<dyn HumanHandoff>,
}

impl HumanAgent {
    pub fn new(name: &str, description: &str, handoff: Arc<dyn HumanHandoff>) -> Self {
        Self {
            descriptor: AgentDescriptor::new(name, description, [Capability::EscalatesToHuman]),
            acknowledgement: DEFAULT_ACKNOWLEDGEMENT.to_string(),
            handoff,
        }
    }

    pub fn with_acknowledgement(mut self, text: impl Into<String>) -> Self {
        self.acknowledgement = text.into();
        self
    }
}

#[async_trait]
impl Agent for HumanAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn process_request(
        &self,
        input: &str,
        user_id: &str,
        session_id: &str,
        _history: &[Message],
    ) -> Result<AgentReply, AgentError> {
        let ticket = HandoffTicket::new(user_id, session_id, input);
        let handoff = Arc::clone(&self.handoff);
        tokio::spawn(async move {
            let ticket_id = ticket.ticket_id;
            if let Err(e) = handoff.notify(ticket).await {
                tracing::warn!(
                    %ticket_id,
                    channel = handoff.name(),
                    error = %e,
                    "Human handoff failed"
                );
            }
        });

        Ok(AgentReply::text(self.acknowledgement.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn acknowledges_and_queues_ticket() {
        let (handoff, mut rx) = QueueHandoff::new(4);
        let agent = HumanAgent::new("Human Agent", "Escalations", Arc::new(handoff));

        let reply = agent
            .process_request("I want to complain", "user-1", "sess-1", &[])
            .await
            .unwrap();
        assert_eq!(reply.output(), DEFAULT_ACKNOWLEDGEMENT);
        assert_eq!(reply.tool_calls_made, 0);

        let ticket = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ticket.raw_text, "I want to complain");
        assert_eq!(ticket.user_id, "user-1");
        assert_eq!(ticket.session_id, "sess-1");
    }

    #[tokio::test]
    async fn closed_queue_does_not_fail_the_reply() {
        let (handoff, rx) = QueueHandoff::new(1);
        drop(rx);
        let agent = HumanAgent::new("Human Agent", "Escalations", Arc::new(handoff))
            .with_acknowledgement("Thanks, a person will follow up.");

        let reply = agent.process_request("help", "u", "s", &[]).await.unwrap();
        assert_eq!(reply.output(), "Thanks, a person will follow up.");
    }

    #[tokio::test]
    async fn queue_reports_closed_channel() {
        let (handoff, rx) = QueueHandoff::new(1);
        drop(rx);
        let err = handoff
            .notify(HandoffTicket::new("u", "s", "x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn tickets_get_unique_ids() {
        let a = HandoffTicket::new("u", "s", "x");
        let b = HandoffTicket::new("u", "s", "x");
        assert_ne!(a.ticket_id, b.ticket_id);
    }
}
