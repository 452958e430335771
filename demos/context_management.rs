//! Context Management Examples
//!
//! The crate ships two ways to keep history bounded:
//! - `Agent`'s built-in [`open_agent::SlidingWindowConversationManager`], which
//!   trims automatically once history grows past a window size (no demo
//!   needed — it just works).
//! - The low-level helpers in this module (`estimate_tokens`,
//!   `truncate_messages`, `is_approaching_limit`), for callers managing their
//!   own `Vec<Message>` outside of `Agent` and who want manual control.
//!
//! Patterns demonstrated:
//! 1. Stateless tasks (fresh `query()` per task, no history accumulation)
//! 2. Manual truncation at natural breakpoints
//! 3. Token budget monitoring with periodic checks

use open_agent::{
    estimate_tokens, is_approaching_limit, query, truncate_messages, Message, OpenAiCompatibleModel,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!("CONTEXT MANAGEMENT EXAMPLES");
    println!("{}", "=".repeat(70));
    println!();

    pattern_1_stateless().await?;
    pattern_2_manual_truncation();
    pattern_3_token_monitoring();

    Ok(())
}

// ============================================================================
// Pattern 1: Stateless Tasks (Recommended)
// ============================================================================
// Best for: single-task work (copy editor, code formatter, etc.)

async fn pattern_1_stateless() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Pattern 1: Stateless Tasks ===");
    println!("Best for: single-task work with no context needed");
    println!();

    let model = Arc::new(OpenAiCompatibleModel::new(
        "http://localhost:11434/v1",
        "qwen3:8b",
    ));

    let tasks = vec!["Explain Rust", "Explain Python", "Explain JavaScript"];

    for task in tasks {
        // Each call to `query` builds a throwaway agent with no shared
        // history — the next task starts from a clean slate.
        let result = query(task, model.clone()).await?;
        let text: String = result
            .message
            .content
            .iter()
            .filter_map(|b| b.as_text())
            .collect();

        println!("Task: {}", task);
        println!("Response length: {} chars", text.len());
        println!("Tokens used: {}", result.usage.total_tokens);
        println!();
    }

    println!("{}", "-".repeat(70));
    println!();

    Ok(())
}

// ============================================================================
// Pattern 2: Manual Truncation at Natural Breakpoints
// ============================================================================
// Best for: multi-turn conversations with clear task boundaries, tracked by
// the caller rather than handed to `Agent`.

fn pattern_2_manual_truncation() {
    println!("=== Pattern 2: Manual Truncation ===");
    println!("Best for: multi-turn conversations with task boundaries");
    println!();

    let mut history = vec![Message::system("You are a helpful coding assistant")];

    println!("Task 1: adding messages to history...");
    history.push(Message::user("Analyze this: def add(a, b): return a + b"));
    history.push(Message::assistant(vec![open_agent::ContentBlock::text(
        "This function adds two numbers.",
    )]));
    println!("After task 1: {} messages", history.len());

    println!("\nTask 2: adding more messages...");
    history.push(Message::user("Write unit tests for the add function"));
    history.push(Message::assistant(vec![open_agent::ContentBlock::text(
        "Here are some unit tests...",
    )]));
    println!("After task 2: {} messages", history.len());

    println!("\nTruncating history (keeping last 3 messages)...");
    history = truncate_messages(&history, 3, true);
    println!("After truncation: {} messages", history.len());

    println!();
    println!("{}", "-".repeat(70));
    println!();
}

// ============================================================================
// Pattern 3: Token Budget Monitoring
// ============================================================================
// Best for: long-running conversations with token limits

fn pattern_3_token_monitoring() {
    println!("=== Pattern 3: Token Budget Monitoring ===");
    println!("Best for: long-running conversations with token limits");
    println!();

    let mut history = vec![Message::system("You are a helpful assistant")];

    let interactions = [
        "What is Rust?",
        "Explain ownership",
        "What are lifetimes?",
        "How do traits work?",
        "Explain async/await",
    ];

    let token_limit = 1000; // example limit (much lower for demo)
    let margin = 0.8; // 80% threshold

    for (i, prompt) in interactions.iter().enumerate() {
        println!("Interaction {}: {}", i + 1, prompt);

        let current_tokens = estimate_tokens(&history);
        println!("  Current tokens: {}", current_tokens);

        if is_approaching_limit(&history, token_limit, margin) {
            println!("  Approaching token limit, truncating...");
            history = truncate_messages(&history, 3, true);
            println!("  After truncation: {} tokens", estimate_tokens(&history));
        }

        history.push(Message::user(*prompt));
        history.push(Message::assistant(vec![open_agent::ContentBlock::text(
            "a".repeat(200),
        )]));

        println!();
    }

    println!("Final history size: {} messages", history.len());
    println!("Final token count: {}", estimate_tokens(&history));

    println!();
    println!("{}", "-".repeat(70));
    println!();
}
