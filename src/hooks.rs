//! # Hook Registry (§4.4)
//!
//! A typed pub/sub keyed by event class. `Before…` callbacks fire in
//! registration order; `After…` callbacks (`AfterInvocationEvent`,
//! `AfterModelCallEvent`, `AfterToolCallEvent`) fire in **reverse**
//! registration order (LIFO cleanup semantics, invariant 3 in §8).
//!
//! This replaces the source SDK's duck-typed handler objects with one
//! concrete event type per lifecycle point — see the "duck-typed callable
//! handler" design note. Each event struct documents exactly which of its
//! fields a hook is allowed to mutate; everything else is read-only by
//! convention.

use crate::error::Result;
use crate::tools::{Tool, ToolResult};
use crate::types::{InvocationState, Message, ToolUseBlock};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fired once at the end of agent construction.
#[derive(Debug, Clone)]
pub struct AgentInitializedEvent;

/// Fired at the start of `invoke` / `stream_async` / `structured_output`.
#[derive(Debug, Clone)]
pub struct BeforeInvocationEvent;

/// Fired at the end of the same, success or failure.
#[derive(Debug, Clone)]
pub struct AfterInvocationEvent;

/// Fired just after a message is appended to history.
#[derive(Debug, Clone)]
pub struct MessageAddedEvent {
    pub message: Message,
}

/// Fired before each model call, including retries.
#[derive(Debug, Clone)]
pub struct BeforeModelCallEvent;

/// Fired after each model call.
///
/// `retry` is the one mutable field: a hook that sets it to `true` forces the
/// retry loop to iterate again even on an otherwise-successful response. Per
/// the open question in §9, a hook-forced retry shares the `max_attempts`
/// budget rather than resetting it.
#[derive(Debug, Clone, Default)]
pub struct AfterModelCallEvent {
    pub stop_response: Option<crate::assembler::AssemblerOutput>,
    pub exception: Option<String>,
    pub retry: bool,
}

/// Fired before each tool call.
///
/// Mutable fields: `selected_tool` (may be replaced, even with a tool not in
/// the registry), `tool_use` (name/input may be rewritten in place), and
/// `invocation_state`. Setting `cancel_tool` to `Some(reason)` skips
/// invocation and synthesizes an error result.
pub struct BeforeToolCallEvent {
    pub selected_tool: Option<Arc<dyn Tool>>,
    pub tool_use: ToolUseBlock,
    pub invocation_state: InvocationState,
    pub cancel_tool: Option<String>,
}

/// Fired after each tool call. Mutable field: `result` (may be replaced
/// wholesale — whatever it holds when dispatch finishes becomes the
/// `tool_result` block placed in history, per invariant 10 in §8).
pub struct AfterToolCallEvent {
    pub selected_tool: Option<Arc<dyn Tool>>,
    pub tool_use: ToolUseBlock,
    pub invocation_state: InvocationState,
    pub result: ToolResult,
    pub exception: Option<String>,
}

type Handler<E> = Arc<dyn Fn(&mut E) -> BoxFuture<'static, Result<()>> + Send + Sync>;

fn handler_of<E, F, Fut>(f: F) -> Handler<E>
where
    F: Fn(&mut E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |event: &mut E| Box::pin(f(event)) as BoxFuture<'static, Result<()>>)
}

/// Attempts every handler even if one errors (the error-handling table's rule
/// for hook callbacks: "do not suppress further callbacks"), then propagates
/// the first error encountered, if any.
async fn dispatch<E>(handlers: &[Handler<E>], event: &mut E, reverse: bool) -> Result<()> {
    let mut first_err = None;
    let indices: Vec<usize> = if reverse {
        (0..handlers.len()).rev().collect()
    } else {
        (0..handlers.len()).collect()
    };
    for i in indices {
        if let Err(e) = (handlers[i])(event).await {
            tracing::warn!(error = %e, "hook callback raised");
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// An object that registers its own hooks exactly once via
/// [`HookRegistry::add_hook`].
pub trait HookProvider {
    fn register_hooks(&self, registry: &mut HookRegistry);
}

/// Typed pub/sub registry. Per-agent and immutable after agent init — hooks
/// may be added during construction only (§5 "Shared resources").
#[derive(Default)]
pub struct HookRegistry {
    agent_initialized: Vec<Handler<AgentInitializedEvent>>,
    before_invocation: Vec<Handler<BeforeInvocationEvent>>,
    after_invocation: Vec<Handler<AfterInvocationEvent>>,
    message_added: Vec<Handler<MessageAddedEvent>>,
    before_model_call: Vec<Handler<BeforeModelCallEvent>>,
    after_model_call: Vec<Handler<AfterModelCallEvent>>,
    before_tool_call: Vec<Handler<BeforeToolCallEvent>>,
    after_tool_call: Vec<Handler<AfterToolCallEvent>>,
}

macro_rules! add_method {
    ($add_name:ident, $field:ident, $event:ty) => {
        pub fn $add_name<F, Fut>(&mut self, f: F)
        where
            F: Fn(&mut $event) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<()>> + Send + 'static,
        {
            self.$field.push(handler_of(f));
        }
    };
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invokes `provider.register_hooks(self)` exactly once.
    pub fn add_hook(&mut self, provider: &dyn HookProvider) {
        provider.register_hooks(self);
    }

    add_method!(add_agent_initialized, agent_initialized, AgentInitializedEvent);
    add_method!(add_before_invocation, before_invocation, BeforeInvocationEvent);
    add_method!(add_after_invocation, after_invocation, AfterInvocationEvent);
    add_method!(add_message_added, message_added, MessageAddedEvent);
    add_method!(add_before_model_call, before_model_call, BeforeModelCallEvent);
    add_method!(add_after_model_call, after_model_call, AfterModelCallEvent);
    add_method!(add_before_tool_call, before_tool_call, BeforeToolCallEvent);
    add_method!(add_after_tool_call, after_tool_call, AfterToolCallEvent);

    pub async fn dispatch_agent_initialized(&self, e: &mut AgentInitializedEvent) -> Result<()> {
        dispatch(&self.agent_initialized, e, false).await
    }

    pub async fn dispatch_before_invocation(&self, e: &mut BeforeInvocationEvent) -> Result<()> {
        dispatch(&self.before_invocation, e, false).await
    }

    pub async fn dispatch_after_invocation(&self, e: &mut AfterInvocationEvent) -> Result<()> {
        dispatch(&self.after_invocation, e, true).await
    }

    pub async fn dispatch_message_added(&self, e: &mut MessageAddedEvent) -> Result<()> {
        dispatch(&self.message_added, e, false).await
    }

    pub async fn dispatch_before_model_call(&self, e: &mut BeforeModelCallEvent) -> Result<()> {
        dispatch(&self.before_model_call, e, false).await
    }

    pub async fn dispatch_after_model_call(&self, e: &mut AfterModelCallEvent) -> Result<()> {
        dispatch(&self.after_model_call, e, true).await
    }

    pub async fn dispatch_before_tool_call(&self, e: &mut BeforeToolCallEvent) -> Result<()> {
        dispatch(&self.before_tool_call, e, false).await
    }

    pub async fn dispatch_after_tool_call(&self, e: &mut AfterToolCallEvent) -> Result<()> {
        dispatch(&self.after_tool_call, e, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_before_hooks_fire_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        for label in ["a", "b", "c"] {
            let order = order.clone();
            registry.add_before_model_call(move |_e| {
                let order = order.clone();
                let label = label;
                async move {
                    order.lock().unwrap().push(label);
                    Ok(())
                }
            });
        }
        registry
            .dispatch_before_model_call(&mut BeforeModelCallEvent)
            .await
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_after_hooks_fire_in_reverse_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        for label in ["a", "b", "c"] {
            let order = order.clone();
            registry.add_after_invocation(move |_e| {
                let order = order.clone();
                let label = label;
                async move {
                    order.lock().unwrap().push(label);
                    Ok(())
                }
            });
        }
        registry
            .dispatch_after_invocation(&mut AfterInvocationEvent)
            .await
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_hook_error_does_not_suppress_later_callbacks() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        {
            let order = order.clone();
            registry.add_before_invocation(move |_e| {
                let order = order.clone();
                async move {
                    order.lock().unwrap().push("first");
                    Err(crate::Error::other("boom"))
                }
            });
        }
        {
            let order = order.clone();
            registry.add_before_invocation(move |_e| {
                let order = order.clone();
                async move {
                    order.lock().unwrap().push("second");
                    Ok(())
                }
            });
        }
        let result = registry
            .dispatch_before_invocation(&mut BeforeInvocationEvent)
            .await;
        assert!(result.is_err());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }
}
