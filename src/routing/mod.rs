//! Request routing: picks the agent for each turn and records the turn.

pub mod orchestrator;
pub mod registry;
pub mod traits;

pub use orchestrator::{Orchestrator, UNAVAILABLE_MESSAGE};
pub use registry::AgentRegistry;
pub use traits::{InboundRequest, RouteMetadata, RouteResponse, Router};
