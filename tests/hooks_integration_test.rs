//! End-to-end tests for the hook registry wired into a running `Agent`:
//! cancellation, result replacement, and before/after call-order guarantees.

use async_trait::async_trait;
use futures::stream;
use open_agent::{
    tool, Agent, BlockDelta, BlockStart, Error, Messages, Model, ModelStream, Role, StopReason,
    StreamEvent, ToolResult, ToolSpec,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

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
        let events = scripts.remove(0);
        Ok(Box::pin(stream::iter(events)) as ModelStream)
    }
}

fn text_script(text: &str) -> Vec<Result<StreamEvent, Error>> {
    vec![
        Ok(StreamEvent::MessageStart { role: Role::Assistant }),
        Ok(StreamEvent::ContentBlockStart { index: 0, start: BlockStart::None }),
        Ok(StreamEvent::ContentBlockDelta { index: 0, delta: BlockDelta::Text(text.to_string()) }),
        Ok(StreamEvent::ContentBlockStop { index: 0 }),
        Ok(StreamEvent::MessageStop { stop_reason: StopReason::EndTurn }),
    ]
}

fn tool_use_script(id: &str, name: &str, input: serde_json::Value) -> Vec<Result<StreamEvent, Error>> {
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
async fn before_tool_call_hook_can_cancel_a_dangerous_call() {
    let model = Arc::new(ScriptedModel {
        scripts: Mutex::new(vec![
            tool_use_script("call_1", "delete_everything", json!({})),
            text_script("cancelled"),
        ]),
    });

    let danger = tool("delete_everything", "deletes everything")
        .build(|_args| async move { Ok(json!({"deleted": true})) });

    let mut agent = Agent::builder()
        .model(model)
        .tool(danger)
        .hooks(|registry| {
            registry.add_before_tool_call(|e| async move {
                if e.tool_use.name == "delete_everything" {
                    e.cancel_tool = Some("blocked by policy".to_string());
                }
                Ok(())
            });
        })
        .build()
        .unwrap();

    agent.invoke("delete everything").await.unwrap();

    let tool_result_message = &agent.history()[2];
    let block = &tool_result_message.content[0];
    assert!(block.as_tool_result().unwrap().is_error());
}

#[tokio::test]
async fn after_tool_call_hook_can_replace_the_result() {
    let model = Arc::new(ScriptedModel {
        scripts: Mutex::new(vec![
            tool_use_script("call_1", "lookup", json!({})),
            text_script("done"),
        ]),
    });

    let lookup = tool("lookup", "looks something up")
        .build(|_args| async move { Ok(json!({"raw": "original"})) });

    let mut agent = Agent::builder()
        .model(model)
        .tool(lookup)
        .hooks(|registry| {
            registry.add_after_tool_call(|e| async move {
                e.result = ToolResult::success(vec![open_agent::ContentBlock::text("replaced")]);
                Ok(())
            });
        })
        .build()
        .unwrap();

    agent.invoke("look it up").await.unwrap();

    let tool_result_message = &agent.history()[2];
    let block = &tool_result_message.content[0];
    let result = block.as_tool_result().unwrap();
    assert_eq!(result.content[0].as_text(), Some("replaced"));
}

#[tokio::test]
async fn before_hooks_fire_in_registration_order_and_after_hooks_reverse() {
    let model = Arc::new(ScriptedModel {
        scripts: Mutex::new(vec![text_script("hi")]),
    });

    let order = Arc::new(Mutex::new(Vec::new()));
    let before_order = order.clone();
    let after_order = order.clone();

    let mut agent = Agent::builder()
        .model(model)
        .hooks(move |registry| {
            for label in ["a", "b"] {
                let order = before_order.clone();
                registry.add_before_model_call(move |_e| {
                    let order = order.clone();
                    async move {
                        order.lock().unwrap().push(format!("before-{label}"));
                        Ok(())
                    }
                });
            }
            for label in ["a", "b"] {
                let order = after_order.clone();
                registry.add_after_model_call(move |_e| {
                    let order = order.clone();
                    async move {
                        order.lock().unwrap().push(format!("after-{label}"));
                        Ok(())
                    }
                });
            }
        })
        .build()
        .unwrap();

    agent.invoke("hi").await.unwrap();

    assert_eq!(
        *order.lock().unwrap(),
        vec!["before-a", "before-b", "after-b", "after-a"]
    );
}
