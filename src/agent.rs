//! Agent facade.
//!
//! [`Agent`] is the stateful, multi-turn entry point: it owns history, tools,
//! hooks, a model, and a conversation manager, and exposes `invoke` /
//! `stream_async` / `structured_output`. The free [`query`] function is
//! ergonomic sugar over a throwaway `Agent` for one-shot, stateless use.
//! Cancellation (`Agent::interrupt`) is an `AtomicBool` flag checked at
//! each suspension point between model calls.

use crate::conversation_manager::{ConversationManager, SlidingWindowConversationManager};
use crate::error::{Error, Result};
use crate::event_loop::{run_cycle, EventLoopConfig};
use crate::events::{AgentEvent, CallbackEvent};
use crate::hooks::{
    AfterInvocationEvent, AfterToolCallEvent, BeforeInvocationEvent, HookProvider, HookRegistry,
    MessageAddedEvent,
};
use crate::model::Model;
use crate::retry::RetryStrategy;
use crate::structured_output::{self, StructuredOutputModel, STRUCTURED_OUTPUT_TOOL_NAME};
use crate::telemetry;
use crate::tools::{
    ConcurrentToolExecutor, SequentialToolExecutor, ToolExecutor, ToolRegistry, ToolResult,
};
use crate::types::{
    AgentResult, AgentState, ContentBlock, InvocationState, Message, Messages, Metrics, Role,
    StopReason, ToolResultBlock, ToolSpec, Usage,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A prompt given to [`Agent::invoke`] / [`Agent::stream_async`].
pub enum Prompt {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Message(Message),
}

impl From<&str> for Prompt {
    fn from(s: &str) -> Self {
        Prompt::Text(s.to_string())
    }
}

impl From<String> for Prompt {
    fn from(s: String) -> Self {
        Prompt::Text(s)
    }
}

impl From<Vec<ContentBlock>> for Prompt {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Prompt::Blocks(blocks)
    }
}

impl From<Message> for Prompt {
    fn from(message: Message) -> Self {
        Prompt::Message(message)
    }
}

impl Prompt {
    fn into_message(self) -> Message {
        match self {
            Prompt::Text(text) => Message::user(text),
            Prompt::Blocks(blocks) => Message::new(Role::User, blocks),
            Prompt::Message(message) => message,
        }
    }
}

/// Builder for [`Agent`].
pub struct AgentBuilder {
    name: String,
    model: Option<Arc<dyn Model>>,
    system_prompt: Option<String>,
    tool_registry: ToolRegistry,
    hooks: HookRegistry,
    conversation_manager: Box<dyn ConversationManager>,
    tool_executor: Box<dyn ToolExecutor>,
    retry_strategy: RetryStrategy,
    initial_state: AgentState,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self {
            name: "agent".to_string(),
            model: None,
            system_prompt: None,
            tool_registry: ToolRegistry::new(),
            hooks: HookRegistry::new(),
            conversation_manager: Box::new(SlidingWindowConversationManager::default()),
            tool_executor: Box::new(ConcurrentToolExecutor),
            retry_strategy: RetryStrategy::default(),
            initial_state: AgentState::new(),
        }
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn model(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tool(mut self, tool: Arc<dyn crate::tools::Tool>) -> Self {
        self.tool_registry.register(tool);
        self
    }

    pub fn hooks(mut self, configure: impl FnOnce(&mut HookRegistry)) -> Self {
        configure(&mut self.hooks);
        self
    }

    pub fn add_hook(mut self, provider: &dyn HookProvider) -> Self {
        self.hooks.add_hook(provider);
        self
    }

    pub fn conversation_manager(mut self, manager: Box<dyn ConversationManager>) -> Self {
        self.conversation_manager = manager;
        self
    }

    /// Use the sequential tool executor instead of the concurrent default.
    pub fn sequential_tools(mut self) -> Self {
        self.tool_executor = Box::new(SequentialToolExecutor);
        self
    }

    pub fn retry_strategy(mut self, retry_strategy: RetryStrategy) -> Self {
        self.retry_strategy = retry_strategy;
        self
    }

    pub fn state(mut self, state: AgentState) -> Self {
        self.initial_state = state;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let model = self
            .model
            .ok_or_else(|| Error::config("Agent requires a model"))?;
        let agent = Agent {
            name: self.name,
            model,
            system_prompt: self.system_prompt,
            tool_registry: self.tool_registry,
            hooks: self.hooks,
            conversation_manager: self.conversation_manager,
            tool_executor: self.tool_executor,
            retry_strategy: self.retry_strategy,
            history: Vec::new(),
            state: self.initial_state,
            interrupted: Arc::new(AtomicBool::new(false)),
        };
        Ok(agent)
    }
}

/// A stateful, multi-turn agent: history, tools, hooks, a model, and a
/// conversation manager, driven one invocation at a time.
pub struct Agent {
    name: String,
    model: Arc<dyn Model>,
    system_prompt: Option<String>,
    tool_registry: ToolRegistry,
    hooks: HookRegistry,
    conversation_manager: Box<dyn ConversationManager>,
    tool_executor: Box<dyn ToolExecutor>,
    retry_strategy: RetryStrategy,
    history: Messages,
    state: AgentState,
    interrupted: Arc<AtomicBool>,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub fn history(&self) -> &Messages {
        &self.history
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AgentState {
        &mut self.state
    }

    pub fn tool_registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tool_registry
    }

    /// Sets the cancellation flag, checked at each suspension point: model
    /// streaming, tool streaming, and retry sleeps.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Synchronous convenience: drives [`Agent::stream_async`] to completion
    /// and discards the intermediate callback events.
    pub async fn invoke(&mut self, prompt: impl Into<Prompt>) -> Result<AgentResult> {
        self.invoke_with_structured_output::<()>(prompt, None).await
    }

    /// Streams callback events as they're produced, followed by exactly one
    /// terminal [`AgentEvent::Result`]. Collects rather than truly streaming
    /// to the caller, since a borrow-checker-clean self-referential async
    /// generator isn't available in stable Rust without boxing every yield
    /// point; callers that need live events should use the `on_callback`
    /// closure overload via [`Agent::invoke_with_callback`] instead, or drain
    /// the returned `Vec` once this returns.
    pub async fn stream_async(&mut self, prompt: impl Into<Prompt>) -> Result<Vec<AgentEvent>> {
        let mut events = Vec::new();
        let result = self
            .run_invocation::<()>(prompt.into(), None, |event| {
                events.push(AgentEvent::Callback(event))
            })
            .await?;
        events.push(AgentEvent::Result(result));
        Ok(events)
    }

    /// Like [`Agent::invoke`], but forwards every callback event to
    /// `on_callback` synchronously as it's produced.
    pub async fn invoke_with_callback(
        &mut self,
        prompt: impl Into<Prompt>,
        on_callback: impl FnMut(CallbackEvent),
    ) -> Result<AgentResult> {
        self.run_invocation::<()>(prompt.into(), None, on_callback).await
    }

    /// Coerces the model into producing one validated `T`, injecting a
    /// synthetic `structured_output` tool spec for this invocation only.
    /// Does not mutate the agent's real tool registry.
    pub async fn structured_output<T: StructuredOutputModel>(
        &mut self,
        prompt: impl Into<Prompt>,
    ) -> Result<(AgentResult, T)> {
        let result = self
            .invoke_with_structured_output::<T>(prompt, Some("extract the requested structured data"))
            .await?;
        let value = result
            .structured_output
            .clone()
            .ok_or_else(|| Error::structured_output("model did not produce a structured_output call"))?;
        let parsed: T = serde_json::from_value(value)
            .map_err(|e| Error::structured_output(format!("{e}")))?;
        Ok((result, parsed))
    }

    async fn invoke_with_structured_output<T: StructuredOutputModel>(
        &mut self,
        prompt: impl Into<Prompt>,
        description: Option<&str>,
    ) -> Result<AgentResult> {
        let extra_specs = description.map(|d| vec![structured_output::synthetic_tool_spec::<T>(d)]);
        self.run_invocation::<T>(prompt.into(), extra_specs, |_| {}).await
    }

    async fn run_invocation<T: StructuredOutputModel>(
        &mut self,
        prompt: Prompt,
        extra_tool_specs: Option<Vec<ToolSpec>>,
        mut on_callback: impl FnMut(CallbackEvent),
    ) -> Result<AgentResult> {
        self.interrupted.store(false, Ordering::SeqCst);

        let user_message = prompt.into_message();
        self.history.push(user_message.clone());
        let mut added = MessageAddedEvent { message: user_message };
        self.hooks.dispatch_message_added(&mut added).await?;

        let mut before = BeforeInvocationEvent;
        self.hooks.dispatch_before_invocation(&mut before).await?;

        let agent_span = telemetry::invoke_agent_span(&self.name, "model");
        let _agent_guard = agent_span.enter();
        telemetry::record_user_message();

        let extra_tool_specs = extra_tool_specs.unwrap_or_default();
        let outcome = self.drive_cycles::<T>(&extra_tool_specs, &mut on_callback).await;

        let mut after = AfterInvocationEvent;
        let after_result = self.hooks.dispatch_after_invocation(&mut after).await;

        // The invocation's own error, if any, happened first and takes
        // precedence over a failure in the after-invocation hook.
        match outcome {
            Ok(result) => after_result.map(|_| result),
            Err(e) => Err(e),
        }
    }

    /// The iterative `while stop_reason == tool_use` loop: runs one cycle,
    /// and if it ended in `tool_use`, executes the tool calls (or validates
    /// the structured-output call) and loops again.
    async fn drive_cycles<T: StructuredOutputModel>(
        &mut self,
        extra_tool_specs: &[ToolSpec],
        on_callback: &mut impl FnMut(CallbackEvent),
    ) -> Result<AgentResult> {
        let mut invocation_state = InvocationState::new();
        let mut total_usage = Usage::default();
        let mut total_metrics = Metrics::default();
        let mut structured_output = None;

        loop {
            if self.is_interrupted() {
                return Err(Error::Cancelled);
            }

            let config = EventLoopConfig {
                model: self.model.as_ref(),
                tool_registry: &self.tool_registry,
                hooks: &self.hooks,
                retry_strategy: self.retry_strategy,
                system_prompt: self.system_prompt.as_deref(),
                extra_tool_specs: extra_tool_specs.to_vec(),
            };

            let cycle_result =
                run_cycle(&mut self.history, &mut invocation_state, &config, |e| on_callback(e)).await;

            let cycle = match cycle_result {
                Ok(cycle) => cycle,
                Err(e) if e.is_context_window_overflow() => {
                    self.conversation_manager.reduce_context(&mut self.history)?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            total_usage.accumulate(&cycle.usage);
            total_metrics.accumulate(&cycle.metrics);
            self.conversation_manager.apply_management(&mut self.history);

            if !cycle.stop_reason.triggers_tool_execution() {
                return Ok(AgentResult {
                    message: cycle.message,
                    stop_reason: cycle.stop_reason,
                    usage: total_usage,
                    metrics: total_metrics,
                    state: self.state.as_map().clone(),
                    structured_output,
                });
            }

            let tool_uses: Vec<_> = cycle.message.tool_uses().cloned().collect();
            let (mut structured_call, real_tool_uses): (Vec<_>, Vec<_>) = tool_uses
                .into_iter()
                .partition(|tu| tu.name == STRUCTURED_OUTPUT_TOOL_NAME);

            let mut result_blocks = Vec::new();
            if let Some(call) = structured_call.pop() {
                let validated: Value = match structured_output::validate::<T>(&call.input) {
                    Ok(_) => call.input.clone(),
                    Err(e) => return Err(e),
                };
                structured_output = Some(validated);
                let mut after = AfterToolCallEvent {
                    selected_tool: None,
                    tool_use: call.clone(),
                    invocation_state: invocation_state.clone(),
                    result: ToolResult::success(vec![ContentBlock::text(
                        "structured output recorded",
                    )]),
                    exception: None,
                };
                self.hooks.dispatch_after_tool_call(&mut after).await?;
                result_blocks.push(after.result.into_block(call.id));
            }

            if !real_tool_uses.is_empty() {
                let (blocks, tool_callbacks) = self
                    .tool_executor
                    .execute(real_tool_uses, &self.tool_registry, &self.hooks, &invocation_state)
                    .await?;
                for cb in tool_callbacks {
                    on_callback(cb);
                }
                result_blocks.extend(blocks);
            }

            let tool_message = Message::new(
                Role::User,
                result_blocks
                    .into_iter()
                    .map(ContentBlock::ToolResult)
                    .collect::<Vec<_>>(),
            );
            self.history.push(tool_message.clone());
            let mut added = MessageAddedEvent { message: tool_message.clone() };
            self.hooks.dispatch_message_added(&mut added).await?;
            on_callback(CallbackEvent::MessageAdded(tool_message));
        }
    }
}

/// One-shot stateless convenience: builds a throwaway [`Agent`], sends one
/// prompt, returns its result.
pub async fn query(prompt: impl Into<Prompt>, model: Arc<dyn Model>) -> Result<AgentResult> {
    let mut agent = Agent::builder().model(model).build()?;
    agent.invoke(prompt).await
}
