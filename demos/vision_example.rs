//! Example demonstrating multimodal image support
//!
//! Images travel as inline base64 bytes (`ImageBlock`), not URLs — this
//! demo decodes a tiny embedded PNG and a couple of text+image prompts
//! against a vision-capable local model.
//!
//! Run this example against a vision-capable model, e.g.:
//!   ollama run llava

use base64::Engine;
use open_agent::{Agent, ContentBlock, ImageBlock, ImageFormat, OpenAiCompatibleModel};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let model = Arc::new(OpenAiCompatibleModel::new(
        "http://localhost:11434/v1",
        "llava",
    ));

    let mut agent = Agent::builder()
        .model(model)
        .system_prompt("You describe images accurately and concisely.")
        .build()?;

    // A 1x1 red pixel PNG, for demonstration.
    let base64_data = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8DwHwAFBQIAX8jx0gAAAABJRU5ErkJggg==";
    let bytes = base64::engine::general_purpose::STANDARD.decode(base64_data)?;

    println!("=== Example 1: Single Image ===\n");

    let prompt = vec![
        ContentBlock::text("What color is this pixel?"),
        ContentBlock::Image(ImageBlock {
            format: ImageFormat::Png,
            bytes: bytes.clone(),
        }),
    ];

    let result = agent.invoke(prompt).await?;
    if let Some(text) = result.message.content.iter().find_map(|b| b.as_text()) {
        println!("Response: {}\n", text);
    }

    println!("=== Example 2: Multiple Images ===\n");

    let prompt = vec![
        ContentBlock::text("Are these two images the same?"),
        ContentBlock::Image(ImageBlock {
            format: ImageFormat::Png,
            bytes: bytes.clone(),
        }),
        ContentBlock::Image(ImageBlock {
            format: ImageFormat::Png,
            bytes,
        }),
    ];

    let result = agent.invoke(prompt).await?;
    if let Some(text) = result.message.content.iter().find_map(|b| b.as_text()) {
        println!("Response: {}\n", text);
    }

    Ok(())
}
