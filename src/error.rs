//! Error taxonomy for the agent runtime.
//!
//! The runtime distinguishes errors the model can plausibly react to (which become
//! an error `ToolResult` and stay inside the loop) from errors that must surface to
//! the caller (cancellation, overflow-after-reduce, structured-output validation
//! failure, hook bugs). See the error handling table in the design notes for the
//! full policy per error kind.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the agent runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error from a model provider adapter.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Generic API error from the model server.
    #[error("API error: {0}")]
    Api(String),

    /// Transport/streaming error while consuming a provider event stream.
    #[error("Streaming error: {0}")]
    Stream(String),

    /// The provider signaled a rate limit. Retryable per the configured
    /// `RetryStrategy` (see [`crate::retry`]).
    #[error("Model throttled: {0}")]
    ModelThrottled(String),

    /// The provider signaled that the prompt no longer fits the context window.
    /// Handled by the agent facade calling `ConversationManager::reduce_context`
    /// and retrying once; re-raised if reduction also fails.
    #[error("Context window overflow: {0}")]
    ContextWindowOverflow(String),

    /// An unretryable or exhausted-retry failure from a model call, wrapped for
    /// propagation out of the event loop.
    #[error("Event loop error: {0}")]
    EventLoop(String),

    /// A structured-output call's input failed validation against the declared
    /// record schema. Never auto-retried by the core.
    #[error("Structured output validation failed: {0}")]
    StructuredOutput(String),

    /// Tool execution error (only used by tool authors; the executor itself
    /// never raises this — it synthesizes an error `ToolResult` instead).
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Invalid input supplied by the caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Request timeout.
    #[error("Request timeout")]
    Timeout,

    /// The invocation was cancelled at a suspension point.
    #[error("Invocation cancelled")]
    Cancelled,

    /// Other errors.
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    pub fn model_throttled(msg: impl Into<String>) -> Self {
        Error::ModelThrottled(msg.into())
    }

    pub fn context_window_overflow(msg: impl Into<String>) -> Self {
        Error::ContextWindowOverflow(msg.into())
    }

    pub fn event_loop(msg: impl Into<String>) -> Self {
        Error::EventLoop(msg.into())
    }

    pub fn structured_output(msg: impl Into<String>) -> Self {
        Error::StructuredOutput(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// Whether this error kind is the one the retry strategy knows how to
    /// retry (throttling). All other kinds bypass retry.
    pub fn is_model_throttled(&self) -> bool {
        matches!(self, Error::ModelThrottled(_))
    }

    pub fn is_context_window_overflow(&self) -> bool {
        matches!(self, Error::ContextWindowOverflow(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("Invalid model");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model");
    }

    #[test]
    fn test_error_model_throttled_is_retryable_kind() {
        let err = Error::model_throttled("rate limited");
        assert!(err.is_model_throttled());
        assert!(!err.is_context_window_overflow());
    }

    #[test]
    fn test_error_context_window_overflow_kind() {
        let err = Error::context_window_overflow("too many tokens");
        assert!(err.is_context_window_overflow());
        assert!(!err.is_model_throttled());
    }

    #[test]
    fn test_error_structured_output() {
        let err = Error::structured_output("missing field age");
        assert!(matches!(err, Error::StructuredOutput(_)));
    }

    #[test]
    fn test_error_timeout() {
        let err = Error::timeout();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.to_string(), "Request timeout");
    }

    #[test]
    fn test_result_type_alias() {
        fn _returns_result() -> Result<i32> {
            Ok(42)
        }
        fn _returns_error() -> Result<i32> {
            Err(Error::timeout())
        }
    }
}
