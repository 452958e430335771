//! Manual context-management utilities.
//!
//! These are opt-in helpers for callers who want direct control over history
//! size instead of (or alongside) the automatic [`crate::conversation_manager::ConversationManager`].
//! The default sliding-window manager does **not** use these — it counts
//! messages, not estimated tokens.

use crate::types::{ContentBlock, Message, Role};

/// Estimate token count for a message list using a character-based
/// approximation (1 token ≈ 4 characters).
///
/// This is an APPROXIMATION. Actual token counts vary by tokenizer; include a
/// 10-20% safety margin when checking limits.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0;
    for message in messages {
        total_chars += 8; // role formatting overhead
        for block in &message.content {
            match block {
                ContentBlock::Text(text) => total_chars += text.text.len(),
                ContentBlock::ToolUse(tool) => {
                    total_chars += tool.name.len();
                    total_chars += tool.id.len();
                    total_chars += tool.input.to_string().len();
                }
                ContentBlock::ToolResult(result) => {
                    total_chars += result.tool_use_id.len();
                    for inner in &result.content {
                        if let ContentBlock::Text(t) = inner {
                            total_chars += t.text.len();
                        }
                    }
                }
                ContentBlock::Reasoning(r) => total_chars += r.text.len(),
                ContentBlock::Image(img) => total_chars += img.bytes.len() / 3, // base64 expansion-ish
                ContentBlock::Document(doc) => total_chars += doc.bytes.len() / 3,
            }
        }
    }
    total_chars += 16; // conversation-level overhead

    (total_chars + 3) / 4 // ceiling division
}

/// Truncate message history, keeping recent messages. Always preserves a
/// leading system message if `preserve_system` is set. Does NOT attempt to
/// preserve `tool_use`/`tool_result` pairing — callers who need that
/// invariant should prefer [`crate::conversation_manager::SlidingWindowConversationManager`].
pub fn truncate_messages(messages: &[Message], keep: usize, preserve_system: bool) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }
    if messages.len() <= keep {
        return messages.to_vec();
    }

    let has_system = preserve_system && messages[0].role == Role::System;

    if has_system {
        let mut result = vec![messages[0].clone()];
        if keep > 0 && messages.len() > 1 {
            let start = messages.len().saturating_sub(keep);
            result.extend_from_slice(&messages[start.max(1)..]);
        }
        result
    } else if keep > 0 {
        let start = messages.len().saturating_sub(keep);
        messages[start..].to_vec()
    } else {
        Vec::new()
    }
}

/// Convenience check combining [`estimate_tokens`] with a threshold: true iff
/// estimated tokens exceed `limit * margin`.
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_empty() {
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn test_estimate_tokens_simple() {
        let messages = vec![Message::user("Hello world")];
        let tokens = estimate_tokens(&messages);
        assert!(tokens >= 3 && tokens <= 10);
    }

    #[test]
    fn test_truncate_messages_empty() {
        let truncated = truncate_messages(&[], 10, true);
        assert_eq!(truncated.len(), 0);
    }

    #[test]
    fn test_truncate_messages_preserve_system() {
        let messages = vec![
            Message::system("System prompt"),
            Message::user("Message 1"),
            Message::user("Message 2"),
            Message::user("Message 3"),
            Message::user("Message 4"),
        ];
        let truncated = truncate_messages(&messages, 2, true);
        assert_eq!(truncated.len(), 3);
        assert_eq!(truncated[0].role, Role::System);
    }

    #[test]
    fn test_truncate_messages_no_preserve() {
        let messages = vec![
            Message::system("System prompt"),
            Message::user("Message 1"),
            Message::user("Message 2"),
            Message::user("Message 3"),
        ];
        let truncated = truncate_messages(&messages, 2, false);
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated[0].role, Role::User);
    }

    #[test]
    fn test_truncate_messages_keep_all() {
        let messages = vec![Message::user("Message 1"), Message::user("Message 2")];
        let truncated = truncate_messages(&messages, 10, true);
        assert_eq!(truncated.len(), 2);
    }

    #[test]
    fn test_is_approaching_limit() {
        let messages = vec![Message::user("x".repeat(1000))];
        assert!(!is_approaching_limit(&messages, 1000, 0.9));
        assert!(is_approaching_limit(&messages, 200, 0.9));
    }
}
