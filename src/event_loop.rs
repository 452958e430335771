//! Event loop: one model-call cycle.
//!
//! `run_cycle` drives exactly one pass: it assigns a fresh `cycle_id`, runs
//! the retry loop around one model call, assembles the response, and appends
//! the resulting assistant message to history. It deliberately stops short of
//! tool execution and recursion — the `while stop_reason == tool_use` loop
//! lives in [`crate::agent::Agent::drive_cycles`], since an `async fn` cannot
//! recurse into itself without boxing every call.

use crate::assembler::{apply_blank_text_hygiene, run_assembler, AssemblerOutput};
use crate::error::{Error, Result};
use crate::events::CallbackEvent;
use crate::hooks::{AfterModelCallEvent, BeforeModelCallEvent, HookRegistry, MessageAddedEvent};
use crate::model::Model;
use crate::retry::RetryStrategy;
use crate::telemetry;
use crate::tools::ToolRegistry;
use crate::types::{InvocationState, Message, Messages, Metrics, StopReason, ToolSpec, Usage};

/// Inputs `run_cycle` needs but doesn't own: the model, the tool registry
/// (snapshotted once at the start of each model call), the hook registry,
/// the retry policy, and anything a caller wants
/// layered into the tool specs for just this invocation (e.g. the structured
/// output adapter's synthetic tool).
pub struct EventLoopConfig<'a> {
    pub model: &'a dyn Model,
    pub tool_registry: &'a ToolRegistry,
    pub hooks: &'a HookRegistry,
    pub retry_strategy: RetryStrategy,
    pub system_prompt: Option<&'a str>,
    pub extra_tool_specs: Vec<ToolSpec>,
}

/// Result of one cycle: the assembled assistant message plus this cycle's
/// usage/metrics (already merged into history by the time this returns).
pub struct CycleOutput {
    pub stop_reason: StopReason,
    pub message: Message,
    pub usage: Usage,
    pub metrics: Metrics,
}

/// Merges a snapshot of the running `request_state` into a callback event
/// whenever its delta carries a partial tool-use fragment (§4.3 step 4), so
/// observers can render live tool args without threading `invocation_state`
/// through the assembler itself.
fn merge_partial_tool_input_state(
    event: CallbackEvent,
    request_state: &serde_json::Map<String, serde_json::Value>,
) -> CallbackEvent {
    match event {
        CallbackEvent::AssemblerDelta {
            delta,
            request_state_snapshot: _,
        } if matches!(delta.delta, crate::events::BlockDelta::ToolUseInput(_)) => {
            CallbackEvent::AssemblerDelta {
                delta,
                request_state_snapshot: Some(request_state.clone()),
            }
        }
        other => other,
    }
}

fn stop_reason_str(stop_reason: StopReason) -> &'static str {
    match stop_reason {
        StopReason::EndTurn => "end_turn",
        StopReason::ToolUse => "tool_use",
        StopReason::MaxTokens => "max_tokens",
        StopReason::StopSequence => "stop_sequence",
        StopReason::GuardrailIntervened => "guardrail_intervened",
        StopReason::ContentFiltered => "content_filtered",
    }
}

/// Runs the retry loop for one model call, then appends the resulting
/// message to `messages` and fires `MessageAddedEvent`.
///
/// `ContextWindowOverflow` is never retried here — it propagates so the
/// agent facade can call `ConversationManager::reduce_context` and retry the
/// whole cycle from scratch.
pub async fn run_cycle(
    messages: &mut Messages,
    invocation_state: &mut InvocationState,
    config: &EventLoopConfig<'_>,
    mut on_callback: impl FnMut(CallbackEvent),
) -> Result<CycleOutput> {
    let is_first_cycle = invocation_state.cycle_count == 0;
    invocation_state.next_cycle();
    if is_first_cycle {
        on_callback(CallbackEvent::Start);
        on_callback(CallbackEvent::StartEventLoop);
    }

    let cycle_span = telemetry::event_loop_cycle_span(invocation_state.cycle_count);
    let _cycle_guard = cycle_span.enter();
    let cycle_start = std::time::Instant::now();
    telemetry::record_metric(telemetry::metrics::EVENT_LOOP_START_CYCLE, 1.0, "1");
    telemetry::record_metric(
        telemetry::metrics::EVENT_LOOP_CYCLE_COUNT,
        invocation_state.cycle_count as f64,
        "1",
    );

    let mut tool_specs = config.tool_registry.specs();
    tool_specs.extend(config.extra_tool_specs.iter().cloned());
    let tool_specs = if tool_specs.is_empty() { None } else { Some(tool_specs) };

    let mut attempt = 0u32;
    let assembled: AssemblerOutput = loop {
        let chat_span = telemetry::chat_span(attempt, "model");
        let _chat_guard = chat_span.enter();

        let mut before = BeforeModelCallEvent;
        config.hooks.dispatch_before_model_call(&mut before).await?;

        let mut hygiene_messages = messages.clone();
        apply_blank_text_hygiene(&mut hygiene_messages);

        let result: Result<AssemblerOutput> = match config
            .model
            .stream(&hygiene_messages, tool_specs.as_deref(), config.system_prompt)
            .await
        {
            Ok(stream) => {
                let request_state = &invocation_state.request_state;
                run_assembler(stream, |cb| on_callback(merge_partial_tool_input_state(cb, request_state)))
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(output) => {
                let mut after = AfterModelCallEvent {
                    stop_response: Some(output.clone()),
                    exception: None,
                    retry: false,
                };
                config.hooks.dispatch_after_model_call(&mut after).await?;
                // A hook may force another attempt even on success; this
                // shares the max_attempts budget rather than resetting it.
                if after.retry && attempt + 1 < config.retry_strategy.max_attempts {
                    attempt += 1;
                    continue;
                }
                break output;
            }
            Err(e) => {
                let mut after = AfterModelCallEvent {
                    stop_response: None,
                    exception: Some(e.to_string()),
                    retry: false,
                };
                config.hooks.dispatch_after_model_call(&mut after).await?;

                if e.is_context_window_overflow() {
                    return Err(e);
                }

                if config.retry_strategy.should_retry(&e, attempt) {
                    let delay = config.retry_strategy.delay_for(attempt);
                    on_callback(CallbackEvent::EventLoopThrottledDelay(delay));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                on_callback(CallbackEvent::ForceStop { reason: e.to_string() });
                return Err(Error::event_loop(e.to_string()));
            }
        }
    };

    messages.push(assembled.message.clone());
    let mut added = MessageAddedEvent {
        message: assembled.message.clone(),
    };
    config.hooks.dispatch_message_added(&mut added).await?;
    on_callback(CallbackEvent::MessageAdded(assembled.message.clone()));
    telemetry::record_assistant_message();
    telemetry::record_choice(stop_reason_str(assembled.stop_reason));
    telemetry::record_metric(
        telemetry::metrics::EVENT_LOOP_INPUT_TOKENS,
        assembled.usage.input_tokens as f64,
        "tokens",
    );
    telemetry::record_metric(
        telemetry::metrics::EVENT_LOOP_OUTPUT_TOKENS,
        assembled.usage.output_tokens as f64,
        "tokens",
    );
    telemetry::record_metric(
        telemetry::metrics::EVENT_LOOP_CYCLE_DURATION,
        cycle_start.elapsed().as_secs_f64(),
        "s",
    );
    telemetry::record_metric(
        telemetry::metrics::EVENT_LOOP_LATENCY,
        assembled.metrics.latency_ms as f64,
        "ms",
    );
    telemetry::record_metric(telemetry::metrics::EVENT_LOOP_END_CYCLE, 1.0, "1");

    Ok(CycleOutput {
        stop_reason: assembled.stop_reason,
        message: assembled.message,
        usage: assembled.usage,
        metrics: assembled.metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BlockDelta, BlockStart, StreamEvent};
    use crate::hooks::HookRegistry;
    use crate::model::ModelStream;
    use crate::tools::ToolRegistry;
    use crate::types::Role;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct ScriptedModel {
        responses: StdMutex<Vec<Result<Vec<Result<StreamEvent>>>>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Model for ScriptedModel {
        async fn stream(
            &self,
            _messages: &Messages,
            _tool_specs: Option<&[ToolSpec]>,
            _system_prompt: Option<&str>,
        ) -> Result<ModelStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            match responses.remove(0) {
                Ok(events) => Ok(Box::pin(stream::iter(events)) as ModelStream),
                Err(e) => Err(e),
            }
        }
    }

    fn text_answer_script(text: &str) -> Vec<Result<StreamEvent>> {
        vec![
            Ok(StreamEvent::MessageStart { role: Role::Assistant }),
            Ok(StreamEvent::ContentBlockStart { index: 0, start: BlockStart::None }),
            Ok(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::Text(text.to_string()),
            }),
            Ok(StreamEvent::ContentBlockStop { index: 0 }),
            Ok(StreamEvent::MessageStop { stop_reason: StopReason::EndTurn }),
        ]
    }

    #[tokio::test]
    async fn test_run_cycle_simple_text_answer_s1() {
        let model = ScriptedModel {
            responses: StdMutex::new(vec![Ok(text_answer_script("hello"))]),
            calls: AtomicU32::new(0),
        };
        let registry = ToolRegistry::new();
        let hooks = HookRegistry::new();
        let config = EventLoopConfig {
            model: &model,
            tool_registry: &registry,
            hooks: &hooks,
            retry_strategy: RetryStrategy::default(),
            system_prompt: None,
            extra_tool_specs: vec![],
        };
        let mut messages = vec![Message::user("hi")];
        let mut invocation_state = InvocationState::new();
        let output = run_cycle(&mut messages, &mut invocation_state, &config, |_| {})
            .await
            .unwrap();
        assert_eq!(output.stop_reason, StopReason::EndTurn);
        assert_eq!(output.message.content[0].as_text(), Some("hello"));
        assert_eq!(messages.len(), 2);
        assert_eq!(invocation_state.cycle_count, 1);
    }

    #[tokio::test]
    async fn test_run_cycle_throttle_then_success_s4() {
        let model = ScriptedModel {
            responses: StdMutex::new(vec![
                Err(Error::model_throttled("429")),
                Ok(text_answer_script("ok")),
            ]),
            calls: AtomicU32::new(0),
        };
        let registry = ToolRegistry::new();
        let hooks = HookRegistry::new();
        let retry_strategy = RetryStrategy::default()
            .with_max_attempts(3)
            .with_initial_delay(std::time::Duration::from_millis(1))
            .with_max_delay(std::time::Duration::from_millis(10));
        let config = EventLoopConfig {
            model: &model,
            tool_registry: &registry,
            hooks: &hooks,
            retry_strategy,
            system_prompt: None,
            extra_tool_specs: vec![],
        };
        let mut messages = vec![Message::user("hi")];
        let mut invocation_state = InvocationState::new();
        let mut throttle_events = 0;
        let output = run_cycle(&mut messages, &mut invocation_state, &config, |cb| {
            if matches!(cb, CallbackEvent::EventLoopThrottledDelay(_)) {
                throttle_events += 1;
            }
        })
        .await
        .unwrap();
        assert_eq!(output.stop_reason, StopReason::EndTurn);
        assert_eq!(throttle_events, 1);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_cycle_context_overflow_propagates_without_retry() {
        let model = ScriptedModel {
            responses: StdMutex::new(vec![Err(Error::context_window_overflow("too long"))]),
            calls: AtomicU32::new(0),
        };
        let registry = ToolRegistry::new();
        let hooks = HookRegistry::new();
        let config = EventLoopConfig {
            model: &model,
            tool_registry: &registry,
            hooks: &hooks,
            retry_strategy: RetryStrategy::default(),
            system_prompt: None,
            extra_tool_specs: vec![],
        };
        let mut messages = vec![Message::user("hi")];
        let mut invocation_state = InvocationState::new();
        let result = run_cycle(&mut messages, &mut invocation_state, &config, |_| {}).await;
        assert!(matches!(result, Err(Error::ContextWindowOverflow(_))));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_tool_input_delta_carries_request_state_snapshot() {
        let model = ScriptedModel {
            responses: StdMutex::new(vec![Ok(vec![
                Ok(StreamEvent::MessageStart { role: Role::Assistant }),
                Ok(StreamEvent::ContentBlockStart {
                    index: 0,
                    start: BlockStart::ToolUse { id: "t1".into(), name: "calc".into() },
                }),
                Ok(StreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: BlockDelta::ToolUseInput("{\"expr\":\"2+2\"}".into()),
                }),
                Ok(StreamEvent::ContentBlockStop { index: 0 }),
                Ok(StreamEvent::MessageStop { stop_reason: StopReason::ToolUse }),
            ])]),
            calls: AtomicU32::new(0),
        };
        let registry = ToolRegistry::new();
        let hooks = HookRegistry::new();
        let config = EventLoopConfig {
            model: &model,
            tool_registry: &registry,
            hooks: &hooks,
            retry_strategy: RetryStrategy::default(),
            system_prompt: None,
            extra_tool_specs: vec![],
        };
        let mut messages = vec![Message::user("2+2?")];
        let mut invocation_state = InvocationState::new();
        invocation_state
            .request_state
            .insert("trace_id".to_string(), serde_json::json!("abc"));
        let mut snapshots = Vec::new();
        run_cycle(&mut messages, &mut invocation_state, &config, |cb| {
            if let CallbackEvent::AssemblerDelta { request_state_snapshot, .. } = cb {
                snapshots.push(request_state_snapshot);
            }
        })
        .await
        .unwrap();
        assert_eq!(snapshots.len(), 1);
        let snapshot = snapshots[0].clone().expect("tool-use delta should carry a snapshot");
        assert_eq!(snapshot.get("trace_id"), Some(&serde_json::json!("abc")));
    }

    #[tokio::test]
    async fn test_run_cycle_unretryable_error_force_stops() {
        let model = ScriptedModel {
            responses: StdMutex::new(vec![Err(Error::api("500 server error"))]),
            calls: AtomicU32::new(0),
        };
        let registry = ToolRegistry::new();
        let hooks = HookRegistry::new();
        let config = EventLoopConfig {
            model: &model,
            tool_registry: &registry,
            hooks: &hooks,
            retry_strategy: RetryStrategy::default(),
            system_prompt: None,
            extra_tool_specs: vec![],
        };
        let mut messages = vec![Message::user("hi")];
        let mut invocation_state = InvocationState::new();
        let mut force_stopped = false;
        let result = run_cycle(&mut messages, &mut invocation_state, &config, |cb| {
            if matches!(cb, CallbackEvent::ForceStop { .. }) {
                force_stopped = true;
            }
        })
        .await;
        assert!(result.is_err());
        assert!(force_stopped);
    }

    #[tokio::test]
    async fn test_before_model_call_hook_error_propagates_and_stops_the_cycle() {
        let model = ScriptedModel {
            responses: StdMutex::new(vec![Ok(text_answer_script("unreachable"))]),
            calls: AtomicU32::new(0),
        };
        let registry = ToolRegistry::new();
        let mut hooks = HookRegistry::new();
        hooks.add_before_model_call(|_e| async { Err(Error::other("hook misconfigured")) });
        let config = EventLoopConfig {
            model: &model,
            tool_registry: &registry,
            hooks: &hooks,
            retry_strategy: RetryStrategy::default(),
            system_prompt: None,
            extra_tool_specs: vec![],
        };
        let mut messages = vec![Message::user("hi")];
        let mut invocation_state = InvocationState::new();
        let result = run_cycle(&mut messages, &mut invocation_state, &config, |_| {}).await;
        assert!(result.is_err());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
