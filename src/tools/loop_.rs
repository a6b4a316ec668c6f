//! Bounded generate → execute tools → re-generate loop.
//!
//! States: `GENERATING → DONE` when the model answers without tool calls, or
//! `GENERATING → EXECUTING → GENERATING` while it keeps requesting tools. The
//! recursion counter increments on every return to `GENERATING`; once it
//! reaches the budget, a further tool request ends the loop with
//! [`ToolLoopOutcome::BudgetExceeded`]. At most `max_recursions + 1` model
//! calls are made.

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::traits::{ToolError, ToolExecutor};
use crate::providers::{ChatRequest, Provider, ProviderError};
use crate::sessions::{ContentBlock, Message, Role};

pub const DEFAULT_MAX_RECURSIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLoopConfig {
    pub max_recursions: usize,
    pub tool_timeout: Duration,
}

impl Default for ToolLoopConfig {
    fn default() -> Self {
        Self {
            max_recursions: DEFAULT_MAX_RECURSIONS,
            tool_timeout: Duration::from_secs(30),
        }
    }
}

/// How a loop run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolLoopOutcome {
    /// The model produced a final answer.
    Resolved { text: String, tool_calls_made: u32 },
    /// The model was still requesting tools when the budget ran out.
    /// `partial` is the last non-empty text the model emitted, if any.
    BudgetExceeded {
        partial: Option<String>,
        tool_calls_made: u32,
    },
    /// A model invocation failed after its own retries.
    ModelFailed {
        error: ProviderError,
        tool_calls_made: u32,
    },
}

impl ToolLoopOutcome {
    pub fn tool_calls_made(&self) -> u32 {
        match self {
            Self::Resolved {
                tool_calls_made, ..
            }
            | Self::BudgetExceeded {
                tool_calls_made, ..
            }
            | Self::ModelFailed {
                tool_calls_made, ..
            } => *tool_calls_made,
        }
    }
}

struct PendingCall {
    id: String,
    name: String,
    input: Value,
}

/// Drive the loop for one turn. `request.messages` holds the history plus
/// the new user message; in-flight tool traffic is appended to a local copy
/// only and never reaches session history.
pub async fn run_tool_loop(
    provider: &dyn Provider,
    mut request: ChatRequest,
    executor: Arc<dyn ToolExecutor>,
    config: &ToolLoopConfig,
) -> ToolLoopOutcome {
    let max_recursions = if config.max_recursions == 0 {
        DEFAULT_MAX_RECURSIONS
    } else {
        config.max_recursions
    };
    request.tools = executor.specs();

    let mut recursion_count = 0usize;
    let mut tool_calls_made = 0u32;
    let mut partial: Option<String> = None;

    loop {
        let response = match provider.chat(&request).await {
            Ok(response) => response,
            Err(error) => {
                return ToolLoopOutcome::ModelFailed {
                    error,
                    tool_calls_made,
                }
            }
        };

        let text = response.text_content();
        if !response.has_tool_use() {
            tracing::debug!(recursion_count, tool_calls_made, "Tool loop resolved");
            return ToolLoopOutcome::Resolved {
                text,
                tool_calls_made,
            };
        }
        if !text.trim().is_empty() {
            partial = Some(text);
        }

        if recursion_count >= max_recursions {
            return ToolLoopOutcome::BudgetExceeded {
                partial,
                tool_calls_made,
            };
        }

        let calls: Vec<PendingCall> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(PendingCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect();

        tool_calls_made += calls.len() as u32;
        let results = execute_calls(&executor, calls, config.tool_timeout).await;

        request
            .messages
            .push(Message::with_blocks(Role::Assistant, response.content));
        request
            .messages
            .push(Message::with_blocks(Role::User, results));

        recursion_count += 1;
        tracing::debug!(recursion_count, tool_calls_made, "Tool loop re-entering generation");
    }
}

/// Execute every call concurrently and return one `ToolResult` block per
/// call, in call order, each tagged with its originating `tool_use_id`.
///
/// Calls run on spawned tasks: if the caller abandons the turn they still run
/// to completion, but their results go nowhere.
async fn execute_calls(
    executor: &Arc<dyn ToolExecutor>,
    calls: Vec<PendingCall>,
    timeout: Duration,
) -> Vec<ContentBlock> {
    let declared: Vec<String> = executor.specs().into_iter().map(|s| s.name).collect();

    let mut pending = Vec::with_capacity(calls.len());
    let mut handles = Vec::with_capacity(calls.len());
    for call in calls {
        let executor = Arc::clone(executor);
        let known = declared.iter().any(|name| *name == call.name);
        pending.push((call.id.clone(), call.name.clone()));
        handles.push(tokio::spawn(async move {
            if !known {
                return Err(ToolError::UnknownTool(call.name));
            }
            tracing::debug!(tool = %call.name, tool_use_id = %call.id, "Executing tool");
            match tokio::time::timeout(timeout, executor.execute(&call.name, &call.input)).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout(call.name)),
            }
        }));
    }

    let joined = join_all(handles).await;

    pending
        .into_iter()
        .zip(joined)
        .map(|((tool_use_id, tool), joined)| {
            let result = joined.unwrap_or_else(|e| {
                Err(ToolError::Failed {
                    tool,
                    reason: format!("tool task aborted: {e}"),
                })
            });
            tool_result_block(tool_use_id, result)
        })
        .collect()
}

fn tool_result_block(tool_use_id: String, result: Result<Value, ToolError>) -> ContentBlock {
    match result {
        Ok(content) => ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error: false,
        },
        Err(err) => {
            tracing::warn!(tool_use_id = %tool_use_id, error = %err, "Tool execution failed");
            ContentBlock::ToolResult {
                tool_use_id,
                content: Value::String(err.to_string()),
                is_error: true,
            }
        }
    }
}
