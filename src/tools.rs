//! # Tool Registry & Executor (§4.5)
//!
//! A [`Tool`] exposes a [`ToolSpec`] (forwarded to the model) and an async
//! `stream` method that may emit progress callbacks before returning its
//! final [`ToolResult`]. The [`ToolRegistry`] holds two tables — `static`
//! (config/decorator-declared) and `dynamic` (runtime-added) — looked up
//! dynamic-first. A [`ToolExecutor`] drives the per-`tool_use` algorithm in
//! §4.5 step by step, including the `Before`/`After` hook dispatch, and is
//! pluggable between sequential and concurrent strategies.

use crate::error::Result;
use crate::events::CallbackEvent;
use crate::hooks::{AfterToolCallEvent, BeforeToolCallEvent, HookRegistry};
use crate::telemetry;
use crate::types::{ContentBlock, InvocationState, ToolResultBlock, ToolResultStatus, ToolSpec, ToolUseBlock};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// The outcome of one tool invocation, independent of which `tool_use` it
/// answers — [`ToolResultBlock`] pairs it back to an id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub status: ToolResultStatus,
    pub content: Vec<ContentBlock>,
}

impl ToolResult {
    pub fn success(content: Vec<ContentBlock>) -> Self {
        Self {
            status: ToolResultStatus::Success,
            content,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolResultStatus::Error,
            content: vec![ContentBlock::text(message.into())],
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolResultStatus::Error
    }

    pub fn into_block(self, tool_use_id: impl Into<String>) -> ToolResultBlock {
        ToolResultBlock::new(tool_use_id, self.status, self.content)
    }
}

/// Converts an arbitrary JSON value returned by a simple function tool into a
/// content block. Strings are carried as plain text; everything else is
/// serialized, since the canonical content model has no separate "raw JSON"
/// block kind — serialized JSON text satisfies the "JSON blobs" allowance in §3.
fn value_to_block(value: Value) -> ContentBlock {
    match value {
        Value::String(s) => ContentBlock::text(s),
        other => ContentBlock::text(other.to_string()),
    }
}

/// A callable tool. `stream` may call `emit` any number of times with
/// progress events before returning; the executor forwards each as a
/// [`CallbackEvent::ToolCallback`] and treats the return value as the final
/// result, exactly as the source contract's "last yielded value MUST be the
/// ToolResult" rule (adapted to a return value since Rust has no bare
/// generator yield).
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn stream(
        &self,
        tool_use: &ToolUseBlock,
        invocation_state: &InvocationState,
        emit: &(dyn Fn(Value) + Send + Sync),
    ) -> Result<ToolResult>;
}

/// Type alias for a simple, non-streaming tool handler: take parsed JSON
/// arguments, return a JSON result or an error.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// A [`Tool`] built from a plain async function. Most tools in practice never
/// call `emit` — they just compute and return.
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    input_schema: Value,
    handler: ToolHandler,
}

impl FunctionTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler,
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }

    async fn stream(
        &self,
        tool_use: &ToolUseBlock,
        _invocation_state: &InvocationState,
        _emit: &(dyn Fn(Value) + Send + Sync),
    ) -> Result<ToolResult> {
        match (self.handler)(tool_use.input.clone()).await {
            Ok(value) => Ok(ToolResult::success(vec![value_to_block(value)])),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

/// Builder for [`FunctionTool`]s, mirroring the ergonomic `tool(...).param(...).build(...)`
/// pattern tool authors expect.
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Option<Value>,
    params: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: None,
            params: serde_json::Map::new(),
            required: Vec::new(),
        }
    }

    /// Supply a full JSON-Schema directly, bypassing `param`.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Add a required parameter with a simple type string (`"string"`,
    /// `"number"`, `"boolean"`, `"object"`, `"array"`).
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        self.params
            .insert(name.to_string(), serde_json::json!({"type": type_str}));
        self.required.push(name.to_string());
        self
    }

    fn build_schema(&self) -> Value {
        if let Some(schema) = &self.schema {
            return schema.clone();
        }
        serde_json::json!({
            "type": "object",
            "properties": Value::Object(self.params.clone()),
            "required": self.required,
        })
    }

    pub fn build<F, Fut>(self, handler: F) -> Arc<dyn Tool>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let schema = self.build_schema();
        let handler: ToolHandler = Arc::new(move |args| Box::pin(handler(args)));
        Arc::new(FunctionTool::new(self.name, self.description, schema, handler))
    }
}

pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Two-table tool registry: `dynamic` tools (runtime-added) are looked up
/// before `static` ones (§4.5 "Registry"). The event loop snapshots
/// [`ToolRegistry::specs`] once per model call (§5): later dynamic-table
/// mutations don't affect a call already in flight.
#[derive(Default)]
pub struct ToolRegistry {
    static_tools: HashMap<String, Arc<dyn Tool>>,
    dynamic_tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.static_tools.insert(tool.spec().name.clone(), tool);
    }

    pub fn register_dynamic(&mut self, tool: Arc<dyn Tool>) {
        self.dynamic_tools.insert(tool.spec().name.clone(), tool);
    }

    pub fn remove_dynamic(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.dynamic_tools.remove(name)
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.dynamic_tools
            .get(name)
            .or_else(|| self.static_tools.get(name))
            .cloned()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.static_tools
            .values()
            .chain(self.dynamic_tools.values())
            .map(|t| t.spec())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.static_tools.is_empty() && self.dynamic_tools.is_empty()
    }
}

/// Runs the §4.5 "Executor algorithm for one `tool_use`" end to end: resolve,
/// fire `BeforeToolCallEvent`, invoke (or skip on cancellation/unknown tool),
/// fire `AfterToolCallEvent`, return the final block.
async fn run_one_tool_use(
    tool_use: ToolUseBlock,
    registry: &ToolRegistry,
    hooks: &HookRegistry,
    invocation_state: &InvocationState,
    sink: &Mutex<Vec<CallbackEvent>>,
) -> Result<ToolResultBlock> {
    let tool_span = telemetry::execute_tool_span(&tool_use.name);
    let _tool_guard = tool_span.enter();
    let tool_start = std::time::Instant::now();
    telemetry::record_metric(telemetry::metrics::TOOL_CALL_COUNT, 1.0, "1");

    let resolved = registry.resolve(&tool_use.name);

    let mut before = BeforeToolCallEvent {
        selected_tool: resolved,
        tool_use,
        invocation_state: invocation_state.clone(),
        cancel_tool: None,
    };
    hooks.dispatch_before_tool_call(&mut before).await?;

    let BeforeToolCallEvent {
        selected_tool,
        tool_use,
        invocation_state,
        cancel_tool,
    } = before;

    let (result, exception) = if let Some(reason) = cancel_tool {
        (ToolResult::error(format!("Tool call cancelled: {reason}")), None)
    } else if let Some(tool) = &selected_tool {
        let emit = |value: Value| {
            sink.lock().unwrap().push(CallbackEvent::ToolCallback {
                tool_use_id: tool_use.id.clone(),
                value,
            });
        };
        match tool.stream(&tool_use, &invocation_state, &emit).await {
            Ok(result) => (result, None),
            Err(e) => (ToolResult::error(format!("Error: {e}")), Some(e.to_string())),
        }
    } else {
        (
            ToolResult::error(format!("Unknown tool: {}", tool_use.name)),
            None,
        )
    };

    let mut after = AfterToolCallEvent {
        selected_tool,
        tool_use: tool_use.clone(),
        invocation_state,
        result,
        exception,
    };
    let hook_result = hooks.dispatch_after_tool_call(&mut after).await;

    telemetry::record_tool_message(&tool_use.id);
    if after.result.is_error() {
        telemetry::record_metric(telemetry::metrics::TOOL_ERROR_COUNT, 1.0, "1");
    } else {
        telemetry::record_metric(telemetry::metrics::TOOL_SUCCESS_COUNT, 1.0, "1");
    }
    telemetry::record_metric(
        telemetry::metrics::TOOL_DURATION,
        tool_start.elapsed().as_secs_f64(),
        "s",
    );

    hook_result?;
    Ok(after.result.into_block(tool_use.id))
}

/// Pluggable strategy for running the `tool_use` blocks of one assistant
/// turn. Both strategies preserve the triggering message's `tool_use` order
/// in the returned `tool_result` blocks (invariant 7, §8).
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        tool_uses: Vec<ToolUseBlock>,
        registry: &ToolRegistry,
        hooks: &HookRegistry,
        invocation_state: &InvocationState,
    ) -> Result<(Vec<ToolResultBlock>, Vec<CallbackEvent>)>;
}

/// Runs tool calls one after another, in assistant order.
pub struct SequentialToolExecutor;

#[async_trait]
impl ToolExecutor for SequentialToolExecutor {
    async fn execute(
        &self,
        tool_uses: Vec<ToolUseBlock>,
        registry: &ToolRegistry,
        hooks: &HookRegistry,
        invocation_state: &InvocationState,
    ) -> Result<(Vec<ToolResultBlock>, Vec<CallbackEvent>)> {
        let sink = Mutex::new(Vec::new());
        let mut blocks = Vec::with_capacity(tool_uses.len());
        for tool_use in tool_uses {
            blocks.push(run_one_tool_use(tool_use, registry, hooks, invocation_state, &sink).await?);
        }
        Ok((blocks, sink.into_inner().unwrap()))
    }
}

/// Runs N ≥ 2 tool calls concurrently and re-assembles the results in the
/// original `tool_use` order regardless of completion order (§4.5, S3 in
/// §8). Cancellation of one tool does not cancel the others.
pub struct ConcurrentToolExecutor;

#[async_trait]
impl ToolExecutor for ConcurrentToolExecutor {
    async fn execute(
        &self,
        tool_uses: Vec<ToolUseBlock>,
        registry: &ToolRegistry,
        hooks: &HookRegistry,
        invocation_state: &InvocationState,
    ) -> Result<(Vec<ToolResultBlock>, Vec<CallbackEvent>)> {
        if tool_uses.len() < 2 {
            return SequentialToolExecutor
                .execute(tool_uses, registry, hooks, invocation_state)
                .await;
        }
        let sink = Mutex::new(Vec::new());
        let futures = tool_uses
            .into_iter()
            .map(|tool_use| run_one_tool_use(tool_use, registry, hooks, invocation_state, &sink));
        let blocks: Vec<ToolResultBlock> = futures::future::join_all(futures)
            .await
            .into_iter()
            .collect::<Result<_>>()?;
        Ok((blocks, sink.into_inner().unwrap()))
    }
}
