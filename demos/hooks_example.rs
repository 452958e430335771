//! Hooks Example
//!
//! Demonstrates monitoring and controlling agent behavior at lifecycle
//! points via the hook registry:
//! - `before_tool_call`: cancel a tool invocation outright
//! - `after_tool_call`: observe (or replace) the result of a tool call
//! - `before_model_call` / `after_model_call`: watch each model round-trip

use open_agent::{tool, Agent, OpenAiCompatibleModel};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("HOOKS EXAMPLE");
    println!("{}", "=".repeat(70));
    println!();

    let shell_tool = tool("run_shell", "Run a shell command")
        .param("command", "string")
        .build(|args| async move {
            let command = args["command"].as_str().unwrap_or("");
            Ok(json!({"ran": command}))
        });

    let model = Arc::new(OpenAiCompatibleModel::new(
        "http://localhost:11434/v1",
        "qwen3:8b",
    ));

    let mut agent = Agent::builder()
        .model(model)
        .system_prompt("You are a helpful assistant")
        .tool(shell_tool)
        .hooks(|registry| {
            registry.add_before_model_call(|_e| async move {
                println!("→ calling model...");
                Ok(())
            });
            registry.add_after_model_call(|e| async move {
                if let Some(output) = &e.stop_response {
                    println!("← model stopped with {:?}", output.stop_reason);
                }
                Ok(())
            });
            registry.add_before_tool_call(|e| async move {
                let dangerous = ["rm ", "DELETE", "DESTROY"];
                let input = e.tool_use.input.to_string();
                if dangerous.iter().any(|kw| input.contains(kw)) {
                    println!("🛑 Hook: cancelling dangerous tool call {}", e.tool_use.name);
                    e.cancel_tool = Some("dangerous command rejected by hook".to_string());
                }
                Ok(())
            });
            registry.add_after_tool_call(|e| async move {
                println!("✓ Hook: {} finished (error={})", e.tool_use.name, e.result.is_error());
                Ok(())
            });
        })
        .build()?;

    println!("Test 1: benign tool call");
    let result = agent.invoke("Run the shell command 'ls -la'").await?;
    println!("Stop reason: {:?}\n", result.stop_reason);

    println!("Test 2: dangerous tool call (hook should cancel it)");
    let result = agent
        .invoke("Run the shell command 'rm -rf /important-data'")
        .await?;
    println!("Stop reason: {:?}\n", result.stop_reason);

    println!("{}", "=".repeat(70));
    println!("Hooks example complete!");
    println!("{}", "=".repeat(70));

    Ok(())
}
