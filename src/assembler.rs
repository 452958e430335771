//! # Streaming Assembler
//!
//! Folds a provider's [`StreamEvent`] sequence into one canonical assistant
//! [`Message`] plus a [`StopReason`] and accumulated [`Usage`]/[`Metrics`],
//! while forwarding per-chunk [`CallbackEvent`]s for observers.
//!
//! One [`Assembler`] instance lives for exactly one cycle. The state machine:
//!
//! ```text
//! Idle ──message_start──► Open
//! Open ──content_block_start──► InBlock(kind)
//! InBlock ──content_block_delta──► InBlock   (accumulate)
//! InBlock ──content_block_stop──► Open       (commit block to content[])
//! Open ──message_stop──► Done                (emit terminal)
//! any  ──metadata──► same                    (accumulate usage/metrics)
//! any  ──redact_content──► same              (rewrite content[])
//! ```
//!
//! Never raises on malformed streams: unexpected event tags are skipped, and
//! if the stream ends without `message_stop` the assembler synthesizes
//! `stop_reason = end_turn` with whatever content was accumulated.

use crate::events::{AssemblerDelta, BlockDelta, BlockStart, CallbackEvent, StreamEvent};
use crate::model::ModelStream;
use crate::types::{
    ContentBlock, Message, Metrics, ReasoningBlock, Role, StopReason, TextBlock, ToolUseBlock,
    Usage,
};
use futures::StreamExt;
use serde_json::Value;

/// The block currently open for accumulation, if any.
#[derive(Debug)]
enum OpenBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        buffer: String,
    },
    Reasoning {
        text: String,
        signature: Option<String>,
    },
}

/// Terminal output of one assembler run: the fully-assembled message plus the
/// stop reason and the usage/metrics observed during this cycle.
#[derive(Debug, Clone)]
pub struct AssemblerOutput {
    pub stop_reason: StopReason,
    pub message: Message,
    pub usage: Usage,
    pub metrics: Metrics,
}

/// One-cycle streaming state machine. See module docs for the transition table.
pub struct Assembler {
    role: Role,
    started: bool,
    content: Vec<ContentBlock>,
    open: Option<(usize, OpenBlock)>,
    usage: Usage,
    metrics: Metrics,
    stop_reason: Option<StopReason>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            role: Role::Assistant,
            started: false,
            content: Vec::new(),
            open: None,
            usage: Usage::default(),
            metrics: Metrics::default(),
            stop_reason: None,
        }
    }

    /// Feed one event into the state machine. Returns any callback deltas
    /// produced, and `Some(output)` once `message_stop` has been processed.
    fn handle(&mut self, event: StreamEvent) -> (Vec<AssemblerDelta>, Option<AssemblerOutput>) {
        let mut deltas = Vec::new();
        match event {
            StreamEvent::MessageStart { role } => {
                self.role = role;
                self.started = true;
            }
            StreamEvent::ContentBlockStart { index, start } => {
                let open = match start {
                    BlockStart::ToolUse { id, name } => OpenBlock::ToolUse {
                        id,
                        name,
                        buffer: String::new(),
                    },
                    BlockStart::None => OpenBlock::Text(String::new()),
                };
                self.open = Some((index, open));
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                if let Some((open_index, open)) = self.open.as_mut() {
                    if *open_index == index {
                        apply_delta(open, &delta);
                        deltas.push(AssemblerDelta { index, delta });
                    }
                } else {
                    // A delta with no preceding content_block_start: open one
                    // implicitly as a text block so we don't drop content.
                    let mut open = OpenBlock::Text(String::new());
                    apply_delta(&mut open, &delta);
                    deltas.push(AssemblerDelta {
                        index,
                        delta: delta.clone(),
                    });
                    self.open = Some((index, open));
                }
            }
            StreamEvent::ContentBlockStop { index } => {
                if let Some((open_index, open)) = self.open.take() {
                    if open_index == index {
                        if let Some(block) = commit_block(open) {
                            self.content.push(block);
                        }
                    } else {
                        // Mismatched index: put it back, ignore the stop.
                        self.open = Some((open_index, open));
                    }
                }
            }
            StreamEvent::MessageStop { stop_reason } => {
                self.stop_reason = Some(stop_reason);
                return (deltas, Some(self.finalize(stop_reason)));
            }
            StreamEvent::Metadata { usage, metrics } => {
                if let Some(u) = usage {
                    self.usage.accumulate(&u);
                }
                if let Some(m) = metrics {
                    self.metrics.accumulate(&m);
                }
            }
            StreamEvent::RedactContent {
                assistant_message, ..
            } => {
                // The entire in-flight assistant message is replaced, not
                // just the currently open block.
                if let Some(text) = assistant_message {
                    self.open = None;
                    self.content = vec![ContentBlock::text(text)];
                }
            }
        }
        (deltas, None)
    }

    fn finalize(&mut self, stop_reason: StopReason) -> AssemblerOutput {
        // If a block was left open (provider never sent content_block_stop),
        // commit it anyway so no content is silently lost.
        if let Some((_, open)) = self.open.take() {
            if let Some(block) = commit_block(open) {
                self.content.push(block);
            }
        }
        AssemblerOutput {
            stop_reason,
            message: Message::new(self.role, std::mem::take(&mut self.content)),
            usage: self.usage,
            metrics: self.metrics,
        }
    }
}

fn apply_delta(open: &mut OpenBlock, delta: &BlockDelta) {
    match (open, delta) {
        (OpenBlock::Text(buf), BlockDelta::Text(t)) => buf.push_str(t),
        (OpenBlock::ToolUse { buffer, .. }, BlockDelta::ToolUseInput(t)) => buffer.push_str(t),
        (OpenBlock::Reasoning { text, .. }, BlockDelta::ReasoningText(t)) => text.push_str(t),
        (OpenBlock::Reasoning { signature, .. }, BlockDelta::ReasoningSignature(s)) => {
            *signature = Some(match signature.take() {
                Some(mut existing) => {
                    existing.push_str(s);
                    existing
                }
                None => s.clone(),
            });
        }
        // Mismatched delta kind for the open block: ignore, per "never raises
        // on malformed streams".
        _ => {}
    }
}

/// Commit rules on `content_block_stop`.
fn commit_block(open: OpenBlock) -> Option<ContentBlock> {
    match open {
        OpenBlock::Text(text) => {
            if text.is_empty() {
                None
            } else {
                Some(ContentBlock::Text(TextBlock { text }))
            }
        }
        OpenBlock::ToolUse { id, name, buffer } => {
            let input: Value = if buffer.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&buffer).unwrap_or_else(|_| serde_json::json!({}))
            };
            Some(ContentBlock::ToolUse(ToolUseBlock { id, name, input }))
        }
        OpenBlock::Reasoning { text, signature } => {
            Some(ContentBlock::Reasoning(ReasoningBlock { text, signature }))
        }
    }
}

/// Drive a model's event stream through an [`Assembler`], invoking
/// `on_callback` for every forwarded delta and returning the terminal output.
///
/// If the upstream stream ends before `message_stop` arrives, synthesizes
/// `stop_reason = end_turn` with whatever was accumulated.
pub async fn run_assembler(
    mut stream: ModelStream,
    mut on_callback: impl FnMut(CallbackEvent),
) -> crate::Result<AssemblerOutput> {
    let mut assembler = Assembler::new();
    while let Some(event) = stream.next().await {
        let event = event?;
        let (deltas, output) = assembler.handle(event);
        for delta in deltas {
            on_callback(CallbackEvent::AssemblerDelta {
                delta,
                request_state_snapshot: None,
            });
        }
        if let Some(output) = output {
            return Ok(output);
        }
    }
    Ok(assembler.finalize(StopReason::EndTurn))
}

/// Pre-send blank-text hygiene, applied to history before each model call —
/// never inside the assembler itself.
///
/// For each assistant message: if it contains at least one `tool_use` block,
/// drop text blocks whose trimmed content is empty; otherwise replace such
/// blanks with the literal string `[blank text]`. Idempotent: applying it
/// twice yields the same result as applying it once.
pub fn apply_blank_text_hygiene(messages: &mut [Message]) {
    for message in messages.iter_mut() {
        if message.role != Role::Assistant {
            continue;
        }
        let has_tool_use = message.tool_uses().next().is_some();
        for block in message.content.iter_mut() {
            if let ContentBlock::Text(text) = block {
                if text.text.trim().is_empty() {
                    if has_tool_use {
                        // Marked for removal below.
                        text.text = String::new();
                    } else {
                        text.text = "[blank text]".to_string();
                    }
                }
            }
        }
        if has_tool_use {
            message.content.retain(|b| match b {
                ContentBlock::Text(t) => !t.text.is_empty(),
                _ => true,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use futures::stream;

    fn boxed(events: Vec<crate::Result<StreamEvent>>) -> ModelStream {
        Box::pin(stream::iter(events))
    }

    #[tokio::test]
    async fn test_simple_text_answer_s1() {
        let events = vec![
            Ok(StreamEvent::MessageStart { role: Role::Assistant }),
            Ok(StreamEvent::ContentBlockStart {
                index: 0,
                start: BlockStart::None,
            }),
            Ok(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::Text("hello".into()),
            }),
            Ok(StreamEvent::ContentBlockStop { index: 0 }),
            Ok(StreamEvent::MessageStop {
                stop_reason: StopReason::EndTurn,
            }),
            Ok(StreamEvent::Metadata {
                usage: Some(Usage {
                    input_tokens: 1,
                    output_tokens: 1,
                    total_tokens: 2,
                }),
                metrics: None,
            }),
        ];
        let mut deltas = Vec::new();
        let output = run_assembler(boxed(events), |cb| deltas.push(cb)).await.unwrap();
        assert_eq!(output.stop_reason, StopReason::EndTurn);
        assert_eq!(output.message.content.len(), 1);
        assert_eq!(output.message.content[0].as_text(), Some("hello"));
        assert_eq!(output.usage.total_tokens, 2);
        assert_eq!(deltas.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_call_json_assembled_across_deltas() {
        let events = vec![
            Ok(StreamEvent::MessageStart { role: Role::Assistant }),
            Ok(StreamEvent::ContentBlockStart {
                index: 0,
                start: BlockStart::ToolUse {
                    id: "t1".into(),
                    name: "calculator".into(),
                },
            }),
            Ok(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::ToolUseInput("{\"expr\":".into()),
            }),
            Ok(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::ToolUseInput("\"2+2\"}".into()),
            }),
            Ok(StreamEvent::ContentBlockStop { index: 0 }),
            Ok(StreamEvent::MessageStop {
                stop_reason: StopReason::ToolUse,
            }),
        ];
        let output = run_assembler(boxed(events), |_| {}).await.unwrap();
        assert_eq!(output.stop_reason, StopReason::ToolUse);
        let tool_use = output.message.content[0].as_tool_use().unwrap();
        assert_eq!(tool_use.name, "calculator");
        assert_eq!(tool_use.input["expr"], "2+2");
    }

    #[tokio::test]
    async fn test_malformed_tool_json_becomes_empty_object() {
        let events = vec![
            Ok(StreamEvent::MessageStart { role: Role::Assistant }),
            Ok(StreamEvent::ContentBlockStart {
                index: 0,
                start: BlockStart::ToolUse {
                    id: "t1".into(),
                    name: "calculator".into(),
                },
            }),
            Ok(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::ToolUseInput("{not json".into()),
            }),
            Ok(StreamEvent::ContentBlockStop { index: 0 }),
            Ok(StreamEvent::MessageStop {
                stop_reason: StopReason::ToolUse,
            }),
        ];
        let output = run_assembler(boxed(events), |_| {}).await.unwrap();
        let tool_use = output.message.content[0].as_tool_use().unwrap();
        assert_eq!(tool_use.input, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_missing_message_stop_synthesizes_end_turn() {
        let events = vec![
            Ok(StreamEvent::MessageStart { role: Role::Assistant }),
            Ok(StreamEvent::ContentBlockStart {
                index: 0,
                start: BlockStart::None,
            }),
            Ok(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::Text("partial".into()),
            }),
        ];
        let output = run_assembler(boxed(events), |_| {}).await.unwrap();
        assert_eq!(output.stop_reason, StopReason::EndTurn);
        assert_eq!(output.message.content[0].as_text(), Some("partial"));
    }

    #[test]
    fn test_blank_text_hygiene_with_tool_use_drops_blank() {
        let mut messages = vec![Message::assistant(vec![
            ContentBlock::text("   "),
            ContentBlock::ToolUse(ToolUseBlock {
                id: "t1".into(),
                name: "x".into(),
                input: Value::Null,
            }),
        ])];
        apply_blank_text_hygiene(&mut messages);
        assert_eq!(messages[0].content.len(), 1);
        assert!(messages[0].content[0].as_tool_use().is_some());
    }

    #[test]
    fn test_blank_text_hygiene_without_tool_use_replaces_blank() {
        let mut messages = vec![Message::assistant(vec![ContentBlock::text("  ")])];
        apply_blank_text_hygiene(&mut messages);
        assert_eq!(messages[0].content[0].as_text(), Some("[blank text]"));
    }

    #[test]
    fn test_blank_text_hygiene_is_idempotent() {
        let mut messages = vec![Message::assistant(vec![ContentBlock::text("  ")])];
        apply_blank_text_hygiene(&mut messages);
        let once = messages.clone();
        apply_blank_text_hygiene(&mut messages);
        assert_eq!(once, messages);
    }
}
