//! # Canonical Data Model
//!
//! This module defines the provider-agnostic types that flow through the agent
//! runtime: [`Message`], [`ContentBlock`], [`StopReason`], [`Usage`], and the
//! per-call [`InvocationState`] / [`AgentState`] scratchpads.
//!
//! ## Invariants
//!
//! - A [`ContentBlock::ToolResult`]'s inner content only ever contains
//!   `Text`, `Image`, `Document`, or a raw JSON blob — never a nested
//!   `ToolUse` or `ToolResult` (enforced by [`ToolResultBlock::new`]).
//! - A [`ContentBlock::ToolUse`]'s `input` is a fully-parsed [`serde_json::Value`],
//!   never a streaming fragment.
//! - A [`Message`] is immutable once appended to history; the only permitted
//!   post-append change is a redaction that replaces the content wholesale.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The role a [`Message`] was authored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        write!(f, "{s}")
    }
}

/// A block of plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

/// A request from the assistant to invoke a tool.
///
/// `input` is always a fully-parsed JSON value by the time this block is
/// committed — the assembler concatenates streamed JSON fragments and parses
/// them once, on `content_block_stop` (see [`crate::assembler`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Outcome status of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// The user-role reply carrying a tool's output, keyed back to the
/// triggering [`ToolUseBlock`] by `tool_use_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub status: ToolResultStatus,
    pub content: Vec<ContentBlock>,
}

impl ToolResultBlock {
    /// Build a `ToolResult`, dropping any nested `tool_use`/`tool_result` block
    /// a caller might have included — §3 forbids tool results from nesting
    /// tool-call structure.
    pub fn new(
        tool_use_id: impl Into<String>,
        status: ToolResultStatus,
        content: Vec<ContentBlock>,
    ) -> Self {
        let content = content
            .into_iter()
            .filter(|b| !matches!(b, ContentBlock::ToolUse(_) | ContentBlock::ToolResult(_)))
            .collect();
        Self {
            tool_use_id: tool_use_id.into(),
            status,
            content,
        }
    }

    pub fn success(tool_use_id: impl Into<String>, content: Vec<ContentBlock>) -> Self {
        Self::new(tool_use_id, ToolResultStatus::Success, content)
    }

    pub fn error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            tool_use_id,
            ToolResultStatus::Error,
            vec![ContentBlock::Text(TextBlock {
                text: message.into(),
            })],
        )
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolResultStatus::Error
    }
}

/// A chain-of-thought block some providers stream alongside visible text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningBlock {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Supported inline image encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    pub format: ImageFormat,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

/// Supported inline document encodings. Open-ended: anything besides the
/// well-known `pdf` is carried as `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBlock {
    pub format: DocumentFormat,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

/// Base64 (de)serialization for binary content blocks — session backends
/// persist binary content base64-encoded per §6, so in-memory and on-disk
/// share one representation.
mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .encode(bytes)
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        use base64::Engine;
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A single unit of [`Message`] content. See the module-level invariants for
/// nesting rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
    Reasoning(ReasoningBlock),
    Image(ImageBlock),
    Document(DocumentBlock),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text(TextBlock { text: text.into() })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(t) => Some(&t.text),
            _ => None,
        }
    }

    pub fn as_tool_use(&self) -> Option<&ToolUseBlock> {
        match self {
            ContentBlock::ToolUse(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResultBlock> {
        match self {
            ContentBlock::ToolResult(t) => Some(t),
            _ => None,
        }
    }
}

/// A single message in conversation history. Immutable once appended except
/// via an explicit redaction that replaces `content`; the session layer is
/// responsible for preserving the associated `message_id` across that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentBlock::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// `tool_use` blocks carried by this message, in order.
    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUseBlock> {
        self.content.iter().filter_map(ContentBlock::as_tool_use)
    }

    /// `tool_result` blocks carried by this message, in order.
    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResultBlock> {
        self.content.iter().filter_map(ContentBlock::as_tool_result)
    }
}

/// Ordered conversation history.
pub type Messages = Vec<Message>;

/// Verifies the history well-formedness invariant from §8.1: whenever an
/// assistant message contains N `tool_use` blocks, the immediately following
/// message contains exactly N `tool_result` blocks with matching ids
/// (order-independent).
pub fn is_well_formed(messages: &Messages) -> bool {
    let mut i = 0;
    while i < messages.len() {
        let uses: Vec<&str> = messages[i].tool_uses().map(|t| t.id.as_str()).collect();
        if uses.is_empty() {
            i += 1;
            continue;
        }
        let Some(next) = messages.get(i + 1) else {
            return false;
        };
        let results: Vec<&str> = next
            .tool_results()
            .map(|t| t.tool_use_id.as_str())
            .collect();
        if results.len() != uses.len() {
            return false;
        }
        for id in &uses {
            if !results.contains(id) {
                return false;
            }
        }
        i += 2;
    }
    true
}

/// Terminal tag on an assistant message indicating why generation ended.
/// `ToolUse` is the only value that causes the event loop to recurse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    GuardrailIntervened,
    ContentFiltered,
}

impl StopReason {
    pub fn triggers_tool_execution(&self) -> bool {
        matches!(self, StopReason::ToolUse)
    }
}

/// Token accounting, additive across cycles (invariant 6 in §8: monotonic
/// non-decreasing across a single invocation).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Wall-clock accounting, additive across cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub latency_ms: u64,
}

impl Metrics {
    pub fn accumulate(&mut self, other: &Metrics) {
        self.latency_ms += other.latency_ms;
    }
}

/// A tool specification as forwarded to the model: name, description, and a
/// JSON-Schema (draft-2020-12 subset) describing its input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Key-value scratchpad owned by the agent. Mutated only by tool code or user
/// code via the agent facade — never by the core loop itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState(serde_json::Map<String, Value>);

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn as_map(&self) -> &serde_json::Map<String, Value> {
        &self.0
    }
}

/// Per-call state carrying the current cycle's tracing id, the running
/// request-state dict, and caller-supplied extras (DB handles, request ids,
/// …). Lifetime is exactly one top-level `invoke`/`stream_async` call.
///
/// This is the explicit record that replaces the source SDK's dynamic
/// `**kwargs` threading: every well-known field is named, and anything else
/// the caller wants to carry through lives in `extras` under a string key.
#[derive(Debug, Clone, Default)]
pub struct InvocationState {
    /// UUID of the cycle currently executing, assigned fresh at the top of
    /// each `event_loop_cycle` (§4.3 step 1).
    pub cycle_id: Option<uuid::Uuid>,
    /// How many cycles have executed so far in this invocation.
    pub cycle_count: u32,
    /// Free-form state the loop and tools read/write as they go.
    pub request_state: serde_json::Map<String, Value>,
    /// Caller-supplied extras (DB handles modeled as opaque JSON, request ids, …).
    pub extras: HashMap<String, Value>,
}

impl InvocationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_cycle(&mut self) {
        self.cycle_id = Some(uuid::Uuid::new_v4());
        self.cycle_count += 1;
    }
}

/// Final payload returned from `invoke` / yielded at the end of `stream_async`.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: Usage,
    pub metrics: Metrics,
    pub state: serde_json::Map<String, Value>,
    pub structured_output: Option<Value>,
}
