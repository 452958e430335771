//! Conversation management contract.
//!
//! The event loop depends on exactly two operations: [`ConversationManager::apply_management`],
//! called after every assistant message is appended, and
//! [`ConversationManager::reduce_context`], called when a model call raises
//! [`crate::Error::ContextWindowOverflow`]. The default implementation is a
//! message-count sliding window that snaps its boundary forward so it never
//! splits a `tool_use`/`tool_result` pair.

use crate::error::{Error, Result};
use crate::types::{ContentBlock, Messages, Role};

/// Per-agent context-reduction strategy.
pub trait ConversationManager: Send + Sync {
    /// Called after every assistant message is appended to history. May
    /// rewrite `messages` in place (drop, compress, summarize).
    fn apply_management(&self, messages: &mut Messages);

    /// Called when the model raised a context-window-overflow error. Must
    /// shrink `messages` so a retried call is likely to fit, or return an
    /// error if it cannot.
    fn reduce_context(&self, messages: &mut Messages) -> Result<()>;
}

/// Default sliding-window manager: keeps the `window_size` most recent
/// messages (plus a leading system message, if present), snapping the
/// boundary forward until no `tool_use`/`tool_result` pair is split. Refuses
/// to shrink below `min_window_size` messages.
#[derive(Debug, Clone)]
pub struct SlidingWindowConversationManager {
    pub window_size: usize,
    pub min_window_size: usize,
}

impl Default for SlidingWindowConversationManager {
    fn default() -> Self {
        Self {
            window_size: 40,
            min_window_size: 4,
        }
    }
}

impl SlidingWindowConversationManager {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            ..Self::default()
        }
    }

    pub fn with_min_window_size(mut self, min_window_size: usize) -> Self {
        self.min_window_size = min_window_size;
        self
    }

    /// Snaps a candidate start index forward so it doesn't begin in the
    /// middle of a `tool_use` → `tool_result` pair: if the message at
    /// `start - 1` is an assistant message with `tool_use` blocks, `start`
    /// must not be that message's matching `tool_result` message — in that
    /// case we push `start` forward past it, since the `tool_use` message
    /// itself is already excluded and a dangling `tool_result` message would
    /// be invalid on its own.
    fn snap_boundary(messages: &Messages, mut start: usize) -> usize {
        while start < messages.len() {
            let at_boundary_is_orphan_result = start > 0
                && messages[start].role == Role::User
                && messages[start]
                    .content
                    .iter()
                    .any(|b| matches!(b, ContentBlock::ToolResult(_)))
                && !matches!(messages.get(start.wrapping_sub(1)), Some(m) if m.tool_uses().next().is_some());
            if at_boundary_is_orphan_result {
                start += 1;
                continue;
            }
            break;
        }
        start
    }

    fn reduce(&self, messages: &mut Messages, target_len: usize) -> Result<()> {
        let has_system = messages.first().map(|m| m.role == Role::System).unwrap_or(false);
        let system_offset = if has_system { 1 } else { 0 };

        if messages.len() <= target_len {
            return Ok(());
        }

        let keep_tail = target_len.saturating_sub(system_offset);
        let mut start = messages.len().saturating_sub(keep_tail);
        start = Self::snap_boundary(messages, start.max(system_offset));

        let kept_len = system_offset + messages.len().saturating_sub(start);
        if kept_len < self.min_window_size {
            return Err(Error::context_window_overflow(format!(
                "cannot reduce history below min_window_size ({}); would leave {} messages",
                self.min_window_size, kept_len
            )));
        }

        let mut reduced = Vec::with_capacity(kept_len);
        if has_system {
            reduced.push(messages[0].clone());
        }
        reduced.extend_from_slice(&messages[start..]);
        *messages = reduced;
        Ok(())
    }
}

impl ConversationManager for SlidingWindowConversationManager {
    fn apply_management(&self, messages: &mut Messages) {
        if messages.len() <= self.window_size {
            return;
        }
        // Best-effort: apply_management never fails the invocation: if
        // snapping would violate min_window_size, leave history untouched
        // and let a future reduce_context (on overflow) handle it, or let it
        // grow until the model itself rejects it.
        let _ = self.reduce(messages, self.window_size);
    }

    fn reduce_context(&self, messages: &mut Messages) -> Result<()> {
        // Drop roughly half the window on overflow, not just down to
        // window_size, since window_size may already be what triggered the
        // overflow.
        let target = (messages.len() / 2).max(self.min_window_size);
        self.reduce(messages, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, ToolResultBlock, ToolUseBlock};
    use serde_json::Value;

    fn tool_pair(id: &str) -> [Message; 2] {
        [
            Message::assistant(vec![ContentBlock::ToolUse(ToolUseBlock {
                id: id.into(),
                name: "t".into(),
                input: Value::Null,
            })]),
            Message::new(
                Role::User,
                vec![ContentBlock::ToolResult(ToolResultBlock::success(
                    id,
                    vec![ContentBlock::text("ok")],
                ))],
            ),
        ]
    }

    #[test]
    fn test_apply_management_noop_below_window_size() {
        let manager = SlidingWindowConversationManager::new(10);
        let mut messages = vec![Message::user("hi")];
        manager.apply_management(&mut messages);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_apply_management_trims_above_window_preserving_system() {
        let manager = SlidingWindowConversationManager::new(4).with_min_window_size(1);
        let mut messages = vec![Message::system("sys")];
        for i in 0..10 {
            messages.push(Message::user(format!("msg {i}")));
        }
        manager.apply_management(&mut messages);
        assert!(messages.len() <= 5);
        assert_eq!(messages[0].role, Role::System);
    }

    #[test]
    fn test_reduce_context_never_splits_tool_pair() {
        let manager = SlidingWindowConversationManager::new(40).with_min_window_size(1);
        let mut messages = vec![Message::user("start")];
        messages.extend(tool_pair("t1"));
        messages.extend(tool_pair("t2"));
        messages.extend(tool_pair("t3"));
        let target = (messages.len() / 2).max(1);
        manager.reduce(&mut messages, target).unwrap();
        assert!(crate::types::is_well_formed(&messages));
    }

    #[test]
    fn test_reduce_context_errors_below_min_window_size() {
        let manager = SlidingWindowConversationManager::new(40).with_min_window_size(100);
        let mut messages = vec![Message::user("a"), Message::user("b"), Message::user("c")];
        let result = manager.reduce_context(&mut messages);
        assert!(result.is_err());
    }

    #[test]
    fn test_reduce_context_shrinks_roughly_in_half() {
        let manager = SlidingWindowConversationManager::default();
        let mut messages: Vec<Message> = (0..20).map(|i| Message::user(format!("m{i}"))).collect();
        let before = messages.len();
        manager.reduce_context(&mut messages).unwrap();
        assert!(messages.len() < before);
    }
}
