//! Routable agents and the classifier that picks between them.
//!
//! Every variant implements [`Agent`]; the orchestrator selects by stable
//! name, never by runtime type.

pub mod chain;
pub mod classifier;
pub mod generative;
pub mod human;
pub mod tool_agent;
pub mod traits;

pub use chain::{ChainAgent, VerifyPolicy};
pub use classifier::{
    AgentSelector, ClassificationResult, Classifier, FallbackReason, LlmClassifier, Selection,
    CLASSIFIER_TOOL,
};
pub use generative::GenerativeAgent;
pub use human::{
    HandoffTicket, HumanAgent, HumanHandoff, LogHandoff, QueueHandoff, DEFAULT_ACKNOWLEDGEMENT,
};
pub use tool_agent::{ToolAgent, DEFAULT_LOOP_FALLBACK};
pub use traits::{Agent, AgentDescriptor, AgentError, AgentReply, Capability};
