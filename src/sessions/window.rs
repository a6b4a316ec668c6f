//! History windowing: drops oldest messages first while keeping the most
//! recent pinned context message.

use super::traits::{ContentBlock, Message};

/// Characters per token for prose; conservative so the estimate runs high.
const CHARS_PER_TOKEN: f64 = 3.2;

/// Role label and formatting overhead per message.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Limits applied before history reaches a model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TruncationPolicy {
    pub max_messages: Option<usize>,
    pub max_tokens: Option<usize>,
}

impl TruncationPolicy {
    pub fn messages(max: usize) -> Self {
        Self {
            max_messages: Some(max),
            max_tokens: None,
        }
    }

    pub fn tokens(max: usize) -> Self {
        Self {
            max_messages: None,
            max_tokens: Some(max),
        }
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    (text.len() as f64 / CHARS_PER_TOKEN).ceil() as usize
}

pub fn estimate_message_tokens(message: &Message) -> usize {
    let body: usize = message
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => estimate_tokens(text),
            ContentBlock::ToolUse { name, input, .. } => {
                estimate_tokens(name) + estimate_tokens(&input.to_string())
            }
            ContentBlock::ToolResult { content, .. } => estimate_tokens(&content.to_string()),
        })
        .sum();
    body + MESSAGE_OVERHEAD_TOKENS
}

/// Apply `policy` to `history`, returning the surviving messages in their
/// original order.
///
/// The most recent pinned message is always kept, even when it alone exceeds
/// the budget. A window never starts with an orphaned tool result.
pub fn truncate_history(history: Vec<Message>, policy: &TruncationPolicy) -> Vec<Message> {
    let pinned_idx = history.iter().rposition(|m| m.pinned);

    let mut kept: Vec<usize> = Vec::with_capacity(history.len());
    let mut tokens = pinned_idx.map_or(0, |i| estimate_message_tokens(&history[i]));
    let mut count = usize::from(pinned_idx.is_some());

    for idx in (0..history.len()).rev() {
        if Some(idx) == pinned_idx {
            continue;
        }
        if policy.max_messages.is_some_and(|max| count >= max) {
            break;
        }
        let cost = estimate_message_tokens(&history[idx]);
        if policy.max_tokens.is_some_and(|max| tokens + cost > max) {
            break;
        }
        tokens += cost;
        count += 1;
        kept.push(idx);
    }

    // Oldest surviving unpinned message must not be a dangling tool result.
    while let Some(&oldest) = kept.last() {
        if history[oldest].has_tool_result() {
            kept.pop();
        } else {
            break;
        }
    }

    if let Some(idx) = pinned_idx {
        kept.push(idx);
    }
    kept.sort_unstable();

    let mut slots: Vec<Option<Message>> = history.into_iter().map(Some).collect();
    kept.into_iter().filter_map(|idx| slots[idx].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::traits::Role;

    fn numbered(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(format!("message {i}"))).collect()
    }

    #[test]
    fn no_limits_keeps_everything() {
        let out = truncate_history(numbered(4), &TruncationPolicy::default());
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn max_messages_drops_oldest_first() {
        let out = truncate_history(numbered(5), &TruncationPolicy::messages(2));
        let texts: Vec<String> = out.iter().map(Message::text).collect();
        assert_eq!(texts, vec!["message 3", "message 4"]);
    }

    #[test]
    fn pinned_message_survives_truncation() {
        let mut history = vec![Message::user("you are talking to ACME support").pinned()];
        history.extend(numbered(6));

        let out = truncate_history(history, &TruncationPolicy::messages(3));
        assert_eq!(out.len(), 3);
        assert!(out[0].pinned);
        assert_eq!(out[1].text(), "message 4");
        assert_eq!(out[2].text(), "message 5");
    }

    #[test]
    fn only_latest_pinned_message_is_protected() {
        let history = vec![
            Message::user("old context").pinned(),
            Message::user("a"),
            Message::user("new context").pinned(),
            Message::user("b"),
        ];
        let out = truncate_history(history, &TruncationPolicy::messages(2));
        let texts: Vec<String> = out.iter().map(Message::text).collect();
        assert_eq!(texts, vec!["new context", "b"]);
    }

    #[test]
    fn token_budget_keeps_recent_suffix() {
        let history = vec![
            Message::user("x".repeat(320)),
            Message::user("short one"),
            Message::assistant("short two"),
        ];
        let out = truncate_history(history, &TruncationPolicy::tokens(20));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text(), "short one");
    }

    #[test]
    fn window_never_starts_with_tool_result() {
        let history = vec![
            Message::user("where is 1?"),
            Message::with_blocks(
                Role::Assistant,
                vec![ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "OrderLookup".into(),
                    input: serde_json::json!({"orderId": "1"}),
                }],
            ),
            Message::with_blocks(
                Role::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "t1".into(),
                    content: serde_json::json!({"status": "Shipped"}),
                    is_error: false,
                }],
            ),
            Message::assistant("It shipped."),
        ];
        let out = truncate_history(history, &TruncationPolicy::messages(2));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text(), "It shipped.");
    }
}
