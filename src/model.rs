//! Uniform model provider contract (§6).
//!
//! The core never parses a provider's wire format itself — it consumes a
//! lazy sequence of canonical [`StreamEvent`]s from whatever implements
//! [`Model`]. Provider adapters (an OpenAI-compatible HTTP client, a fake for
//! tests, …) live behind this trait; see [`crate::providers`].

use crate::error::Result;
use crate::events::StreamEvent;
use crate::types::{Messages, ToolSpec};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// A lazy, ownable sequence of canonical stream events.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A model provider. `stream` raises [`crate::Error::ModelThrottled`] on
/// provider rate-limit signals and [`crate::Error::ContextWindowOverflow`] on
/// prompt-too-long signals; all other errors are provider-defined and treated
/// as non-retryable by the core.
#[async_trait]
pub trait Model: Send + Sync {
    async fn stream(
        &self,
        messages: &Messages,
        tool_specs: Option<&[ToolSpec]>,
        system_prompt: Option<&str>,
    ) -> Result<ModelStream>;
}
