//! Calculator with Tools Example
//!
//! Demonstrates giving a local LLM function-calling abilities through the
//! tool registry. The agent drives tool resolution, invocation, and the
//! follow-up model call itself; the demo just reads back the final answer.

use open_agent::{tool, Agent, OpenAiCompatibleModel};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let add_tool = tool("add", "Add two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            Ok(json!({"result": a + b}))
        });

    let subtract_tool = tool("subtract", "Subtract two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            Ok(json!({"result": a - b}))
        });

    let multiply_tool = tool("multiply", "Multiply two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            Ok(json!({"result": a * b}))
        });

    let divide_tool = tool("divide", "Divide two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            if b == 0.0 {
                return Err(open_agent::Error::tool("cannot divide by zero"));
            }
            Ok(json!({"result": a / b}))
        });

    let model = Arc::new(OpenAiCompatibleModel::new(
        "http://localhost:11434/v1",
        "qwen3:8b",
    ));

    let mut agent = Agent::builder()
        .model(model)
        .system_prompt(
            "You are a helpful calculator assistant. \
             Use the provided tools to perform calculations. \
             Always show your work and explain the result.",
        )
        .tool(add_tool)
        .tool(subtract_tool)
        .tool(multiply_tool)
        .tool(divide_tool)
        .build()?;

    let queries = vec![
        "What is 25 plus 17?",
        "Calculate 144 divided by 12",
        "What's 7 times 8, then add 5?",
    ];

    println!("{}", "=".repeat(70));
    println!("CALCULATOR TOOLS EXAMPLE");
    println!("{}", "=".repeat(70));
    println!();

    for query in queries {
        println!("User: {}", query);
        println!("{}", "-".repeat(50));

        let result = agent.invoke(query).await?;

        for block in &result.message.content {
            if let Some(text) = block.as_text() {
                if !text.trim().is_empty() {
                    println!("Assistant: {}", text);
                }
            }
        }

        println!();
    }

    println!("{}", "=".repeat(70));
    println!("Example complete!");

    Ok(())
}
