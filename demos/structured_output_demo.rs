//! Structured Output Example
//!
//! Demonstrates coercing a model into returning one validated, strongly-typed
//! value via `Agent::structured_output`. Under the hood the agent injects a
//! synthetic tool spec derived from `PersonInfo`'s JSON schema for this one
//! call; the real tool registry is untouched.

use open_agent::OpenAiCompatibleModel;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
struct PersonInfo {
    name: String,
    age: u32,
    occupation: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("STRUCTURED OUTPUT EXAMPLE");
    println!("{}", "=".repeat(70));
    println!();

    let model = Arc::new(OpenAiCompatibleModel::new(
        "http://localhost:11434/v1",
        "qwen3:8b",
    ));

    let mut agent = open_agent::Agent::builder()
        .model(model)
        .system_prompt("You extract structured information from text.")
        .build()?;

    let text =
        "John Smith is a 30 year old software engineer living in San Francisco.";

    println!("Input: {}", text);
    println!();

    let (result, person): (_, PersonInfo) = agent
        .structured_output::<PersonInfo>(format!("Extract the person's info from: {}", text))
        .await?;

    println!("Extracted: {:?}", person);
    println!("Stop reason: {:?}", result.stop_reason);
    println!("Tokens used: {}", result.usage.total_tokens);

    Ok(())
}
