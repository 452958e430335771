//! End-to-end `Agent` behavior against a scripted fake model, exercising the
//! public API the way a caller would: no access to crate-internal test
//! helpers, only what's exported from `open_agent`.

use async_trait::async_trait;
use futures::stream;
use open_agent::{
    tool, Agent, BlockDelta, BlockStart, Error, Message, Messages, Model, ModelStream, Role,
    StopReason, StreamEvent, ToolSpec,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// A fake [`Model`] that replays one pre-scripted event sequence per call to
/// `stream`, in order. Each test configures exactly as many scripts as the
/// agent is expected to make model calls.
struct ScriptedModel {
    scripts: Mutex<Vec<Vec<Result<StreamEvent, Error>>>>,
}

#[async_trait]
impl Model for ScriptedModel {
    async fn stream(
        &self,
        _messages: &Messages,
        _tool_specs: Option<&[ToolSpec]>,
        _system_prompt: Option<&str>,
    ) -> Result<ModelStream, Error> {
        let mut scripts = self.scripts.lock().unwrap();
        assert!(!scripts.is_empty(), "model called more times than scripted");
        let events = scripts.remove(0);
        Ok(Box::pin(stream::iter(events)) as ModelStream)
    }
}

fn text_script(text: &str, stop_reason: StopReason) -> Vec<Result<StreamEvent, Error>> {
    vec![
        Ok(StreamEvent::MessageStart { role: Role::Assistant }),
        Ok(StreamEvent::ContentBlockStart { index: 0, start: BlockStart::None }),
        Ok(StreamEvent::ContentBlockDelta { index: 0, delta: BlockDelta::Text(text.to_string()) }),
        Ok(StreamEvent::ContentBlockStop { index: 0 }),
        Ok(StreamEvent::MessageStop { stop_reason }),
    ]
}

fn tool_use_script(id: &str, name: &str, input: Value) -> Vec<Result<StreamEvent, Error>> {
    vec![
        Ok(StreamEvent::MessageStart { role: Role::Assistant }),
        Ok(StreamEvent::ContentBlockStart {
            index: 0,
            start: BlockStart::ToolUse { id: id.to_string(), name: name.to_string() },
        }),
        Ok(StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::ToolUseInput(input.to_string()),
        }),
        Ok(StreamEvent::ContentBlockStop { index: 0 }),
        Ok(StreamEvent::MessageStop { stop_reason: StopReason::ToolUse }),
    ]
}

#[tokio::test]
async fn invoke_returns_plain_text_answer() {
    let model = Arc::new(ScriptedModel {
        scripts: Mutex::new(vec![text_script("Paris is the capital of France.", StopReason::EndTurn)]),
    });

    let mut agent = Agent::builder().model(model).build().unwrap();
    let result = agent.invoke("What's the capital of France?").await.unwrap();

    assert_eq!(result.stop_reason, StopReason::EndTurn);
    assert_eq!(
        result.message.content[0].as_text(),
        Some("Paris is the capital of France.")
    );
    assert_eq!(agent.history().len(), 2);
}

#[tokio::test]
async fn invoke_drives_a_tool_call_to_completion() {
    let model = Arc::new(ScriptedModel {
        scripts: Mutex::new(vec![
            tool_use_script("call_1", "add", json!({"a": 2, "b": 2})),
            text_script("4", StopReason::EndTurn),
        ]),
    });

    let add = tool("add", "adds two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            Ok(json!({"result": a + b}))
        });

    let mut agent = Agent::builder().model(model).tool(add).build().unwrap();
    let result = agent.invoke("what's 2+2?").await.unwrap();

    assert_eq!(result.stop_reason, StopReason::EndTurn);
    assert_eq!(result.message.content[0].as_text(), Some("4"));
    // user, assistant(tool_use), user(tool_result), assistant(text)
    assert_eq!(agent.history().len(), 4);
    assert!(open_agent::is_well_formed(agent.history()));
}

#[tokio::test]
async fn unknown_tool_name_synthesizes_an_error_result_without_failing_the_call() {
    let model = Arc::new(ScriptedModel {
        scripts: Mutex::new(vec![
            tool_use_script("call_1", "does_not_exist", json!({})),
            text_script("I couldn't find that tool.", StopReason::EndTurn),
        ]),
    });

    let mut agent = Agent::builder().model(model).build().unwrap();
    let result = agent.invoke("do the thing").await.unwrap();

    assert_eq!(result.stop_reason, StopReason::EndTurn);
    let tool_result_message = &agent.history()[2];
    assert_eq!(tool_result_message.role, Role::User);
    let block = &tool_result_message.content[0];
    assert!(block.as_tool_result().unwrap().is_error());
}

#[tokio::test]
async fn interrupt_cancels_before_the_next_cycle() {
    let model = Arc::new(ScriptedModel {
        scripts: Mutex::new(vec![text_script("hello", StopReason::EndTurn)]),
    });

    let mut agent = Agent::builder().model(model).build().unwrap();
    agent.interrupt();

    let result = agent.invoke("hi").await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn structured_output_validates_and_returns_the_typed_value() {
    #[derive(Debug, serde::Deserialize, schemars::JsonSchema, PartialEq)]
    struct PersonInfo {
        name: String,
        age: u32,
    }

    let payload = json!({"name": "John Smith", "age": 30});
    let model = Arc::new(ScriptedModel {
        scripts: Mutex::new(vec![tool_use_script(
            "call_1",
            open_agent::STRUCTURED_OUTPUT_TOOL_NAME,
            payload,
        )]),
    });

    let mut agent = Agent::builder().model(model).build().unwrap();
    let (result, person) = agent
        .structured_output::<PersonInfo>("Extract: John Smith, 30 years old")
        .await
        .unwrap();

    assert_eq!(person.name, "John Smith");
    assert_eq!(person.age, 30);
    assert!(result.structured_output.is_some());
}

#[tokio::test]
async fn conversation_history_survives_multiple_invocations() {
    let model = Arc::new(ScriptedModel {
        scripts: Mutex::new(vec![
            text_script("first answer", StopReason::EndTurn),
            text_script("second answer", StopReason::EndTurn),
        ]),
    });

    let mut agent = Agent::builder().model(model).build().unwrap();
    agent.invoke("first question").await.unwrap();
    agent.invoke("second question").await.unwrap();

    assert_eq!(agent.history().len(), 4);
    assert_eq!(agent.history()[0], Message::user("first question"));
    assert_eq!(agent.history()[2], Message::user("second question"));
}
