//! # Open Agent SDK - Rust Implementation
//!
//! A streaming-first Rust runtime for driving a conversation between a user, a
//! language-model provider, and a set of callable tools until the model
//! signals completion.
//!
//! ## Architecture
//!
//! - **types**: The canonical data model — `Message`, `ContentBlock`, `StopReason`,
//!   `Usage`, `InvocationState`, `AgentState`.
//! - **events**: The provider-agnostic `StreamEvent` union and the observer-visible
//!   `CallbackEvent` union.
//! - **assembler**: Folds a `StreamEvent` sequence into one canonical assistant
//!   `Message` plus `StopReason` and accumulated `Usage`/`Metrics`.
//! - **event_loop**: One model-call cycle — retries, assembly, history append.
//! - **hooks**: A typed pub/sub lifecycle registry with documented ordering guarantees.
//! - **tools**: The tool registry and the sequential/concurrent executors.
//! - **agent**: The public facade — `Agent::invoke` / `stream_async` / `structured_output`,
//!   plus the free `query()` convenience function.
//! - **conversation_manager**: The context-reduction contract and its default
//!   sliding-window implementation.
//! - **session**: The session-persistence contract and an in-memory reference implementation.
//! - **structured_output**: Coerces a model into one validated, strongly-typed value.
//! - **retry**: The model-throttle backoff policy, plus general-purpose retry helpers.
//! - **telemetry**: `tracing`-based spans and structured metric fields (OTel GenAI conventions).
//! - **model** / **providers**: The uniform model-provider contract and a reference
//!   OpenAI-wire-compatible adapter (LM Studio, Ollama, llama.cpp, vLLM).
//! - **context**: Opt-in manual token estimation and history truncation helpers.
//! - **config**: Provider base-URL / model-name resolution helpers.
//! - **error**: The `Error` enum and `Result<T>` alias used throughout.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use open_agent::{Agent, OpenAiCompatibleModel};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = Arc::new(OpenAiCompatibleModel::new(
//!         "http://localhost:1234/v1",
//!         "qwen2.5-32b-instruct",
//!     ));
//!
//!     let mut agent = Agent::builder()
//!         .model(model)
//!         .system_prompt("You are a helpful assistant")
//!         .build()?;
//!
//!     let result = agent.invoke("What's the capital of France?").await?;
//!     println!("{:?}", result.message);
//!     Ok(())
//! }
//! ```
//!
//! For a one-shot, stateless call without building an `Agent` explicitly, use
//! [`query`].

mod agent;
mod assembler;
mod config;
mod context;
mod conversation_manager;
mod error;
mod event_loop;
mod events;
mod hooks;
mod model;
pub mod providers;
pub mod retry;
mod session;
mod structured_output;
mod telemetry;
mod tools;
mod types;

// --- Agent Facade ---

pub use agent::{Agent, AgentBuilder, Prompt, query};

// --- Provider Configuration ---

pub use config::{Provider, get_base_url, get_model};

// --- Context Management (manual helpers) ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

// --- Conversation Management (automatic, overflow-driven) ---

pub use conversation_manager::{ConversationManager, SlidingWindowConversationManager};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Stream & Callback Events ---

pub use events::{AgentEvent, AssemblerDelta, BlockDelta, BlockStart, CallbackEvent, StreamEvent};

// --- Lifecycle Hooks ---

pub use hooks::{
    AfterInvocationEvent, AfterModelCallEvent, AfterToolCallEvent, AgentInitializedEvent,
    BeforeInvocationEvent, BeforeModelCallEvent, BeforeToolCallEvent, HookProvider, HookRegistry,
    MessageAddedEvent,
};

// --- Model Provider Contract ---

pub use model::{Model, ModelStream};
pub use providers::OpenAiCompatibleModel;

// --- Retry Strategy ---

pub use retry::RetryStrategy;

// --- Session Persistence Contract ---

pub use session::{InMemorySessionManager, Session, SessionAgent, SessionManager, SessionMessage};

// --- Structured Output Adapter ---

pub use structured_output::{STRUCTURED_OUTPUT_TOOL_NAME, StructuredOutputModel};

// --- Tool System ---

pub use tools::{
    ConcurrentToolExecutor, FunctionTool, SequentialToolExecutor, Tool, ToolExecutor,
    ToolRegistry, ToolResult, tool,
};

// --- Core Types ---

pub use types::{
    AgentResult, AgentState, ContentBlock, DocumentBlock, DocumentFormat, ImageBlock, ImageFormat,
    InvocationState, Message, Messages, Metrics, ReasoningBlock, Role, StopReason, TextBlock,
    ToolResultBlock, ToolResultStatus, ToolSpec, ToolUseBlock, Usage, is_well_formed,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module containing the most commonly used types and functions.
/// Import with `use open_agent::prelude::*;` to get everything needed for
/// typical usage: building an `Agent`, defining tools, registering hooks, and
/// reading back results.
pub mod prelude {
    pub use crate::{
        Agent, AgentBuilder, AgentResult, CallbackEvent, ContentBlock, Error, HookRegistry,
        Message, Model, OpenAiCompatibleModel, Prompt, Result, Role, StopReason, Tool, ToolResult,
        query, tool,
    };
}
