//! Stream event and callback event unions.
//!
//! [`StreamEvent`] is the canonical, provider-agnostic wire event every model
//! adapter must produce. [`CallbackEvent`] is the observer-visible record the
//! assembler, event loop, and tool executor forward to callers — it never
//! affects control flow, only UI/telemetry.

use crate::types::{Metrics, Role, StopReason, Usage};
use serde_json::Value;

/// What a `content_block_start` opens.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockStart {
    ToolUse { id: String, name: String },
    None,
}

/// A single streamed fragment appended to the currently open block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockDelta {
    Text(String),
    /// Raw JSON fragment; concatenated across deltas and parsed once on
    /// `content_block_stop`.
    ToolUseInput(String),
    ReasoningText(String),
    ReasoningSignature(String),
}

/// The canonical stream event a [`crate::model::Model`] adapter yields, one
/// per provider chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Begins a new assistant message. Exactly once per cycle, first.
    MessageStart { role: Role },
    /// Opens a content block at `index`.
    ContentBlockStart { index: usize, start: BlockStart },
    /// Appends to the block open at `index`.
    ContentBlockDelta { index: usize, delta: BlockDelta },
    /// Closes the block at `index`; the assembler commits it to `content[]`.
    ContentBlockStop { index: usize },
    /// Ends the message.
    MessageStop { stop_reason: StopReason },
    /// May arrive at any point; usage/metrics accumulate additively.
    Metadata {
        usage: Option<Usage>,
        metrics: Option<Metrics>,
    },
    /// Replaces the entire in-flight assistant message (and/or the last user
    /// message) with redacted text. A mid-block arrival is treated as
    /// replacing the whole in-flight message, not just the open block.
    RedactContent {
        assistant_message: Option<String>,
        user_message: Option<String>,
    },
}

/// A single streamed fragment forwarded to observers from inside the
/// assembler's state machine, paired with the block index it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblerDelta {
    pub index: usize,
    pub delta: BlockDelta,
}

/// Observer-visible records yielded throughout one invocation. Never affects
/// control flow — see the Event (callback) glossary entry.
#[derive(Debug, Clone)]
pub enum CallbackEvent {
    /// `{start: true}` — once per invocation.
    Start,
    /// `{start_event_loop: true}` — once per invocation.
    StartEventLoop,
    /// A per-chunk delta forwarded from the assembler. `partial_tool_input`
    /// carries a snapshot of the invocation state's `request_state` whenever
    /// the delta is a tool-use fragment, so UIs can render live tool args.
    AssemblerDelta {
        delta: AssemblerDelta,
        request_state_snapshot: Option<serde_json::Map<String, Value>>,
    },
    /// Fired just after a message is appended to history.
    MessageAdded(crate::types::Message),
    /// A callback event forwarded verbatim from a tool's own event stream.
    ToolCallback { tool_use_id: String, value: Value },
    /// Emitted once per throttle-triggered retry sleep.
    EventLoopThrottledDelay(std::time::Duration),
    /// Emitted when an unretryable error forces the loop to stop.
    ForceStop { reason: String },
}

/// Top-level events yielded by `Agent::stream_async`: zero or more
/// [`CallbackEvent`]s followed by exactly one terminal result.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Callback(CallbackEvent),
    Result(crate::types::AgentResult),
}
