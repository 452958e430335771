//! Interrupt Capability Demo
//!
//! `Agent::interrupt()` sets a flag checked once at the top of every
//! event-loop cycle (i.e. between model calls, not mid-stream within a
//! single call) — an in-flight model response always finishes, but the
//! next tool-use cycle is aborted with `Error::Cancelled`. This demo shows:
//!
//! 1. Interrupting a multi-cycle tool loop from a concurrent task
//! 2. Recovering and retrying after a cancelled invocation
//!
//! Note: requires Ollama running at http://localhost:11434 with a model
//! loaded.

use open_agent::{tool, Agent, Error, OpenAiCompatibleModel};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

async fn concurrent_cancel_example() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(60));
    println!("Example 1: Cancelling a Tool Loop from Another Task");
    println!("{}", "=".repeat(60));
    println!();

    let call_count = Arc::new(AtomicU32::new(0));
    let counter = call_count.clone();

    // A tool that never signals "done" on its own, forcing the model into
    // repeated tool_use cycles until something stops it.
    let tick = tool("tick", "Advance an internal counter by one and report its value")
        .build(move |_args| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!({"count": n}))
            }
        });

    let model = Arc::new(OpenAiCompatibleModel::new(
        "http://localhost:11434/v1",
        "qwen3:8b",
    ));

    let mut agent = Agent::builder()
        .model(model)
        .system_prompt("Call the tick tool repeatedly, as many times as you can.")
        .tool(tick)
        .build()?;

    let agent = Arc::new(tokio::sync::Mutex::new(agent));
    let agent_clone = agent.clone();

    let cancel_handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        println!("\n🛑 Cancelling from a concurrent task...");
        agent_clone.lock().await.interrupt();
    });

    let result = agent
        .lock()
        .await
        .invoke("Keep calling tick until I tell you to stop")
        .await;

    cancel_handle.await?;

    match result {
        Ok(r) => println!("Completed without interruption: {:?}", r.stop_reason),
        Err(Error::Cancelled) => {
            println!(
                "Interrupted after {} tool call(s), as expected",
                call_count.load(Ordering::SeqCst)
            );
        }
        Err(e) => println!("Unexpected error: {}", e),
    }

    println!();
    Ok(())
}

async fn retry_after_cancel_example() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(60));
    println!("Example 2: Interrupt, Then Retry");
    println!("{}", "=".repeat(60));
    println!();

    let model = Arc::new(OpenAiCompatibleModel::new(
        "http://localhost:11434/v1",
        "qwen3:8b",
    ));

    let counting = tool("tick", "Advance a counter by one")
        .build(|_args| async move { Ok(json!({"ok": true})) });

    let agent = Agent::builder()
        .model(model)
        .system_prompt("Call the tick tool repeatedly without stopping.")
        .tool(counting)
        .build()?;

    let agent = Arc::new(tokio::sync::Mutex::new(agent));
    let agent_clone = agent.clone();
    let cancel_handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        agent_clone.lock().await.interrupt();
    });

    println!("First invocation (will be interrupted mid tool-loop)...");
    match agent.lock().await.invoke("Keep calling tick forever").await {
        Err(Error::Cancelled) => println!("Cancelled as expected.\n"),
        other => println!("Unexpected result: {:?}\n", other.map(|r| r.stop_reason)),
    }
    cancel_handle.await?;

    // `interrupt()` only affects the invocation in flight when it was set —
    // the very next `invoke` resets the flag, so the agent is immediately
    // reusable.
    println!("Retrying with a fresh, unrelated call...");
    let result = agent
        .lock()
        .await
        .invoke("Tell me about Alan Turing in 2 sentences")
        .await?;
    if let Some(text) = result.message.content.iter().find_map(|b| b.as_text()) {
        println!("{}", text);
    }
    println!("\nSuccess! Query completed after retry.\n");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n{}", "=".repeat(60));
    println!("INTERRUPT CAPABILITY DEMO");
    println!("{}", "=".repeat(60));
    println!();

    if let Err(e) = concurrent_cancel_example().await {
        eprintln!("Concurrent cancel example error: {}", e);
    }

    if let Err(e) = retry_after_cancel_example().await {
        eprintln!("Retry example error: {}", e);
    }

    println!("{}", "=".repeat(60));
    println!("All examples completed!");
    println!("{}", "=".repeat(60));

    Ok(())
}
