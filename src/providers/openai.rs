//! Reference [`Model`] adapter: OpenAI-wire-compatible local servers (LM
//! Studio, Ollama, llama.cpp, vLLM).
//!
//! Translates the provider's `chat.completion.chunk` SSE stream into the
//! canonical [`StreamEvent`] sequence (§4.1) at the adapter boundary — the
//! same boundary the donor drew between `utils::parse_sse_stream` and the
//! rest of the crate, generalized here to emit streaming deltas instead of
//! pre-aggregated content blocks, since the canonical assembler now owns
//! accumulation.

use crate::error::{Error, Result};
use crate::events::{BlockDelta, BlockStart, StreamEvent};
use crate::model::{Model, ModelStream};
use crate::types::{ContentBlock, Messages, Role, StopReason, ToolSpec, Usage};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::pin::Pin;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAIToolSpec>>,
    stream_options: OpenAIStreamOptions,
}

#[derive(Debug, Serialize)]
struct OpenAIStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIToolSpec {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAIFunctionSpec,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionSpec {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<OpenAIContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAIImageUrl },
}

#[derive(Debug, Serialize)]
struct OpenAIImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAIToolCallFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIChunk {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIChoice {
    #[serde(default)]
    delta: OpenAIDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

fn tool_spec_to_wire(spec: &ToolSpec) -> OpenAIToolSpec {
    OpenAIToolSpec {
        kind: "function",
        function: OpenAIFunctionSpec {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.input_schema.clone(),
        },
    }
}

fn image_data_uri(format: crate::types::ImageFormat, bytes: &[u8]) -> String {
    use base64::Engine;
    let mime = match format {
        crate::types::ImageFormat::Png => "image/png",
        crate::types::ImageFormat::Jpeg => "image/jpeg",
        crate::types::ImageFormat::Gif => "image/gif",
        crate::types::ImageFormat::Webp => "image/webp",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{encoded}")
}

/// Converts one non-tool-result message's content into wire `content`,
/// using the multi-part form only when an image is present.
fn content_to_wire(blocks: &[ContentBlock]) -> Option<OpenAIContent> {
    let has_image = blocks.iter().any(|b| matches!(b, ContentBlock::Image(_)));
    if !has_image {
        let text = blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.text.clone()),
                ContentBlock::Document(d) => Some(format!("[document omitted: {:?}]", d.format)),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        return if text.is_empty() { None } else { Some(OpenAIContent::Text(text)) };
    }

    let mut parts = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text(t) if !t.text.is_empty() => {
                parts.push(OpenAIContentPart::Text { text: t.text.clone() });
            }
            ContentBlock::Image(img) => parts.push(OpenAIContentPart::ImageUrl {
                image_url: OpenAIImageUrl {
                    url: image_data_uri(img.format, &img.bytes),
                },
            }),
            _ => {}
        }
    }
    if parts.is_empty() { None } else { Some(OpenAIContent::Parts(parts)) }
}

/// Converts canonical history into the wire message list. `tool_result`
/// blocks (always carried by `user`-role messages) expand into one `tool`
/// role message each, since the OpenAI wire format has no concept of a
/// single message holding several tool results.
fn messages_to_wire(messages: &Messages, system_prompt: Option<&str>) -> Vec<OpenAIMessage> {
    let mut wire = Vec::new();
    if let Some(system_prompt) = system_prompt {
        wire.push(OpenAIMessage {
            role: "system",
            content: Some(OpenAIContent::Text(system_prompt.to_string())),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for message in messages {
        let tool_results: Vec<_> = message.tool_results().collect();
        if !tool_results.is_empty() {
            for result in tool_results {
                let text = result
                    .content
                    .iter()
                    .filter_map(|b| b.as_text())
                    .collect::<Vec<_>>()
                    .join("\n");
                wire.push(OpenAIMessage {
                    role: "tool",
                    content: Some(OpenAIContent::Text(text)),
                    tool_calls: None,
                    tool_call_id: Some(result.tool_use_id.clone()),
                });
            }
            continue;
        }

        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let tool_calls: Vec<OpenAIToolCall> = message
            .tool_uses()
            .map(|tu| OpenAIToolCall {
                id: tu.id.clone(),
                kind: "function",
                function: OpenAIToolCallFunction {
                    name: tu.name.clone(),
                    arguments: tu.input.to_string(),
                },
            })
            .collect();

        wire.push(OpenAIMessage {
            role,
            content: content_to_wire(&message.content),
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            tool_call_id: None,
        });
    }
    wire
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::EndTurn,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        "content_filter" => StopReason::ContentFiltered,
        _ => StopReason::EndTurn,
    }
}

/// Stateful translator from `chat.completion.chunk` JSON into the canonical
/// [`StreamEvent`] sequence. Text always occupies block index `0`; each tool
/// call occupies `1 + its wire index`, assuming (as OpenAI-compatible
/// servers do) that a tool call's `id`/`name` both arrive on the delta that
/// first mentions its index, with only `arguments` streamed incrementally
/// afterward.
#[derive(Default)]
struct SseTranslator {
    started: bool,
    text_open: bool,
    opened_tool_indices: BTreeSet<u32>,
}

impl SseTranslator {
    fn translate(&mut self, chunk: OpenAIChunk) -> Vec<Result<StreamEvent>> {
        let mut events = Vec::new();
        if !self.started {
            events.push(Ok(StreamEvent::MessageStart { role: Role::Assistant }));
            self.started = true;
        }

        for choice in &chunk.choices {
            if let Some(content) = &choice.delta.content {
                if !self.text_open {
                    events.push(Ok(StreamEvent::ContentBlockStart {
                        index: 0,
                        start: BlockStart::None,
                    }));
                    self.text_open = true;
                }
                events.push(Ok(StreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: BlockDelta::Text(content.clone()),
                }));
            }

            if let Some(tool_calls) = &choice.delta.tool_calls {
                for tc in tool_calls {
                    let index = 1 + tc.index as usize;
                    if !self.opened_tool_indices.contains(&tc.index) {
                        let id = tc.id.clone().unwrap_or_default();
                        let name = tc
                            .function
                            .as_ref()
                            .and_then(|f| f.name.clone())
                            .unwrap_or_default();
                        events.push(Ok(StreamEvent::ContentBlockStart {
                            index,
                            start: BlockStart::ToolUse { id, name },
                        }));
                        self.opened_tool_indices.insert(tc.index);
                    }
                    if let Some(args) = tc.function.as_ref().and_then(|f| f.arguments.clone()) {
                        events.push(Ok(StreamEvent::ContentBlockDelta {
                            index,
                            delta: BlockDelta::ToolUseInput(args),
                        }));
                    }
                }
            }

            if let Some(reason) = &choice.finish_reason {
                if self.text_open {
                    events.push(Ok(StreamEvent::ContentBlockStop { index: 0 }));
                    self.text_open = false;
                }
                for &tool_index in &self.opened_tool_indices {
                    events.push(Ok(StreamEvent::ContentBlockStop { index: 1 + tool_index as usize }));
                }
                self.opened_tool_indices.clear();
                events.push(Ok(StreamEvent::MessageStop {
                    stop_reason: map_finish_reason(reason),
                }));
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(Ok(StreamEvent::Metadata {
                usage: Some(Usage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                    total_tokens: usage.total_tokens,
                }),
                metrics: None,
            }));
        }

        events
    }
}

fn parse_sse_lines(
    body: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<OpenAIChunk>> + Send>> {
    let stream = body.bytes_stream().filter_map(move |result| async move {
        let bytes = match result.map_err(Error::Http) {
            Ok(b) => b,
            Err(e) => return Some(Err(e)),
        };
        let text = String::from_utf8_lossy(&bytes).into_owned();
        for line in text.lines() {
            if let Some(data) = line.strip_prefix("data: ") {
                if data == "[DONE]" {
                    continue;
                }
                return Some(
                    serde_json::from_str::<OpenAIChunk>(data)
                        .map_err(|e| Error::stream(format!("failed to parse chunk: {e}"))),
                );
            }
        }
        None
    });
    Box::pin(stream)
}

/// A [`Model`] speaking the OpenAI-compatible `chat.completion` wire format
/// over HTTP + SSE, suitable for LM Studio, Ollama, llama.cpp, and vLLM.
pub struct OpenAiCompatibleModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAiCompatibleModel {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_timeout(base_url, model, Duration::from_secs(120))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.into(),
            model: model.into(),
            api_key: String::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[async_trait]
impl Model for OpenAiCompatibleModel {
    async fn stream(
        &self,
        messages: &Messages,
        tool_specs: Option<&[ToolSpec]>,
        system_prompt: Option<&str>,
    ) -> Result<ModelStream> {
        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: messages_to_wire(messages, system_prompt),
            stream: true,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools: tool_specs.map(|specs| specs.iter().map(tool_spec_to_wire).collect()),
            stream_options: OpenAIStreamOptions { include_usage: true },
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(Error::model_throttled(body));
            }
            if status.as_u16() == 400
                && (body.contains("context length") || body.contains("context_length"))
            {
                return Err(Error::context_window_overflow(body));
            }
            return Err(Error::api(format!("{status}: {body}")));
        }

        let chunks = parse_sse_lines(response);
        let mut translator = SseTranslator::default();
        let events = chunks
            .flat_map(move |chunk_result| {
                let events = match chunk_result {
                    Ok(chunk) => translator.translate(chunk),
                    Err(e) => vec![Err(e)],
                };
                futures::stream::iter(events)
            });

        Ok(Box::pin(events))
    }
}
