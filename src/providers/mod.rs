//! Concrete [`crate::model::Model`] adapters.
//!
//! The core is provider-agnostic; this crate ships one reference adapter,
//! [`openai::OpenAiCompatibleModel`], targeting OpenAI-wire-compatible local
//! servers (LM Studio, Ollama, llama.cpp, vLLM).

pub mod openai;

pub use openai::OpenAiCompatibleModel;
