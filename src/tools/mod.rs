//! Tool subsystem for agent-callable capabilities.
//!
//! Each tool implements the [`Tool`] trait defined in [`traits`]: a name, a
//! description, a JSON parameter schema, and an async `execute`. Tools are
//! grouped per agent in a [`ToolRegistry`], which validates model-supplied
//! input against the declared schema before any handler runs.
//!
//! [`run_tool_loop`] drives the bounded generate → execute → re-generate
//! cycle for tool-using agents.

pub mod loop_;
pub mod orders;
pub mod registry;
pub mod schema;
pub mod traits;

pub use loop_::{run_tool_loop, ToolLoopConfig, ToolLoopOutcome, DEFAULT_MAX_RECURSIONS};
pub use orders::{
    order_management_tools, InMemoryRecords, OrderLookupTool, RecordLookup, ReturnProcessorTool,
    ShipmentTrackerTool,
};
pub use registry::ToolRegistry;
pub use schema::validate_input;
pub use traits::{Tool, ToolError, ToolExecutor, ToolSpec};

use anyhow::Result;
use std::sync::Arc;

/// Registry holding the order-management tools.
pub fn order_management_registry(
    orders: Arc<dyn RecordLookup>,
    shipments: Arc<dyn RecordLookup>,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in order_management_tools(orders, shipments) {
        registry.register(tool)?;
    }
    Ok(registry)
}
