//! Multi-Tool Agent Example
//!
//! Demonstrates a realistic agent with several tools and safety/logging
//! hooks, driven entirely through `Agent::invoke` (tool resolution,
//! execution, and the follow-up model call all happen inside the event
//! loop — no manual dispatch needed).
//!
//! Usage:
//!   cargo run --example multi_tool_agent
//!
//! Requires:
//!   - Ollama running on localhost:11434
//!   - qwen3:8b model (or adjust model name)

use open_agent::{tool, Agent, OpenAiCompatibleModel};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("MULTI-TOOL AGENT DEMO");
    println!("Realistic agent with 5 tools and safety/logging hooks");
    println!("{}", "=".repeat(70));
    println!();

    let execution_log = Arc::new(Mutex::new(Vec::new()));

    let calculator = tool("calculate", "Perform arithmetic")
        .param("operation", "string")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let op = args["operation"].as_str().unwrap_or("");
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);

            let result = match op {
                "add" => a + b,
                "subtract" => a - b,
                "multiply" => a * b,
                "divide" => {
                    if b == 0.0 {
                        return Err(open_agent::Error::tool("Division by zero"));
                    }
                    a / b
                }
                _ => return Err(open_agent::Error::tool("Unknown operation")),
            };

            Ok(json!({"result": result, "operation": op}))
        });

    let datetime = tool("get_datetime", "Get current date and time")
        .param("format", "string")
        .build(|args| async move {
            let format = args["format"].as_str().unwrap_or("unix");
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_secs();

            let formatted = match format {
                "unix" => now.to_string(),
                _ => format!("Unix timestamp: {}", now),
            };

            Ok(json!({"datetime": formatted, "format": format}))
        });

    let converter = tool("convert_units", "Convert between units")
        .param("value", "number")
        .param("from_unit", "string")
        .param("to_unit", "string")
        .build(|args| async move {
            let value = args["value"].as_f64().unwrap_or(0.0);
            let from = args["from_unit"].as_str().unwrap_or("");
            let to = args["to_unit"].as_str().unwrap_or("");

            let result = match (from, to) {
                ("km", "miles") => value * 0.621371,
                ("miles", "km") => value / 0.621371,
                ("kg", "lbs") => value * 2.20462,
                ("lbs", "kg") => value / 2.20462,
                ("celsius", "fahrenheit") => (value * 9.0 / 5.0) + 32.0,
                ("fahrenheit", "celsius") => (value - 32.0) * 5.0 / 9.0,
                _ => return Err(open_agent::Error::tool("Unsupported conversion")),
            };

            Ok(json!({
                "result": result,
                "from": from,
                "to": to,
                "original_value": value
            }))
        });

    let search = tool("search", "Search for information")
        .param("query", "string")
        .build(|args| async move {
            let query = args["query"].as_str().unwrap_or("");

            Ok(json!({
                "results": [
                    {"title": format!("Result for: {}", query), "relevance": 0.95},
                    {"title": "Related information", "relevance": 0.80},
                ],
                "query": query
            }))
        });

    let formatter = tool("format_data", "Format data as table/list")
        .param("data", "object")
        .param("format", "string")
        .build(|args| async move {
            let format = args["format"].as_str().unwrap_or("list");

            Ok(json!({
                "formatted": format!("Data formatted as: {}", format),
                "format": format
            }))
        });

    let model = Arc::new(OpenAiCompatibleModel::new(
        "http://localhost:11434/v1",
        "qwen3:8b",
    ));

    let log_for_hook = execution_log.clone();

    let mut agent = Agent::builder()
        .model(model)
        .system_prompt(
            "You are a helpful multi-tool assistant. You have access to: \
             calculator, datetime, unit converter, search, and data formatter. \
             Use these tools to help answer questions. \
             Always use tools for calculations and conversions.",
        )
        .tool(calculator)
        .tool(datetime)
        .tool(converter)
        .tool(search)
        .tool(formatter)
        .hooks(move |registry| {
            registry.add_before_tool_call(|e| async move {
                println!("before tool call: {}", e.tool_use.name);

                if e.tool_use.name == "calculate" {
                    if let Some("divide") = e.tool_use.input.get("operation").and_then(|v| v.as_str()) {
                        if e.tool_use.input.get("b").and_then(|v| v.as_f64()) == Some(0.0) {
                            println!("   blocked: division by zero");
                            e.cancel_tool = Some("division by zero prevented".to_string());
                        }
                    }
                }

                Ok(())
            });

            let log = log_for_hook.clone();
            registry.add_after_tool_call(move |e| {
                let log = log.clone();
                async move {
                    println!("after tool call: {} (error={})", e.tool_use.name, e.result.is_error());
                    let timestamp = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap()
                        .as_secs();
                    log.lock().unwrap().push(format!(
                        "[{}] {} -> error={}",
                        timestamp,
                        e.tool_use.name,
                        e.result.is_error()
                    ));
                    Ok(())
                }
            });
        })
        .build()?;

    println!("Agent configured with:");
    println!("- 5 tools: calculator, datetime, converter, search, formatter");
    println!("- before_tool_call hook: blocks division by zero");
    println!("- after_tool_call hook: logs every invocation");
    println!();
    println!("{}", "-".repeat(70));
    println!();

    let queries = [
        "What's 15 kilometers in miles?",
        "Calculate 25 divided by 5, then multiply by 3",
        "What's the current Unix timestamp?",
        "Search for information about Rust programming",
    ];

    for (i, query) in queries.iter().enumerate() {
        println!("Query {}: {}", i + 1, query);
        println!();

        let result = agent.invoke(*query).await?;

        for block in &result.message.content {
            if let Some(text) = block.as_text() {
                if !text.trim().is_empty() {
                    println!("Assistant: {}", text);
                }
            }
        }

        println!();
        println!("{}", "-".repeat(70));
        println!();
    }

    println!("Execution Log:");
    println!("{}", "=".repeat(70));
    for entry in execution_log.lock().unwrap().iter() {
        println!("{}", entry);
    }
    println!("{}", "=".repeat(70));
    println!();

    println!("Conversation history: {} messages", agent.history().len());
    println!();
    println!("History breakdown:");
    for (i, msg) in agent.history().iter().enumerate() {
        println!("  {}. {:?} - {} content blocks", i + 1, msg.role, msg.content.len());
    }
    println!();

    println!("{}", "=".repeat(70));
    println!("DEMO COMPLETE");
    println!("{}", "=".repeat(70));

    Ok(())
}
