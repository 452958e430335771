//! Simple query example
//!
//! Demonstrates the one-shot `query` convenience function against a local
//! OpenAI-wire-compatible server (LM Studio, Ollama, llama.cpp, vLLM).

use open_agent::{query, OpenAiCompatibleModel};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let model = Arc::new(OpenAiCompatibleModel::new(
        "http://localhost:11434/v1",
        "qwen3:8b",
    ));

    println!("Sending query to model...\n");

    let result = query("What's the capital of France? Please be brief.", model).await?;

    if let Some(text) = result.message.content.iter().find_map(|b| b.as_text()) {
        println!("Response: {}", text);
    }

    println!(
        "\nStop reason: {:?}, tokens: {}",
        result.stop_reason, result.usage.total_tokens
    );

    Ok(())
}
