//! Telemetry surface (§6).
//!
//! The core never bundles an exporter — it only emits `tracing` spans and
//! structured fields following OTel's GenAI semantic conventions, the same
//! "spans + structured fields as metrics" style the pack's otel-hook crate
//! uses. Wiring a concrete subscriber (console, OTLP) is left to the
//! embedding application.
//!
//! Span names: `invoke_agent <name>`, `execute_event_loop_cycle`, `chat`,
//! `execute_tool <name>`. Span events: `gen_ai.user.message`,
//! `gen_ai.assistant.message`, `gen_ai.tool.message`, `gen_ai.choice`. Metric
//! instruments are recorded as `tracing::info!` records carrying the
//! instrument name, value, and unit as structured fields (see
//! [`record_metric`]).

use tracing::{info, info_span, Span};

/// Opens the top-level `invoke_agent <name>` span for one `invoke` /
/// `stream_async` / `structured_output` call.
pub fn invoke_agent_span(agent_name: &str, model: &str) -> Span {
    info_span!(
        "invoke_agent",
        gen_ai.system = "open_agent",
        agent.name = %agent_name,
        operation.name = "invoke_agent",
        request.model = %model,
    )
}

/// Opens the `execute_event_loop_cycle` span for one cycle.
pub fn event_loop_cycle_span(cycle_count: u32) -> Span {
    info_span!("execute_event_loop_cycle", cycle_count)
}

/// Opens the `chat` span for one model call attempt.
pub fn chat_span(attempt: u32, model: &str) -> Span {
    info_span!("chat", gen_ai.system = "open_agent", gen_ai.request.model = %model, attempt)
}

/// Opens the `execute_tool <name>` span for one tool invocation.
pub fn execute_tool_span(tool_name: &str) -> Span {
    info_span!("execute_tool", gen_ai.tool.name = %tool_name)
}

/// Emits the `gen_ai.user.message` span event.
pub fn record_user_message() {
    info!(name: "gen_ai.user.message");
}

/// Emits the `gen_ai.assistant.message` span event.
pub fn record_assistant_message() {
    info!(name: "gen_ai.assistant.message");
}

/// Emits the `gen_ai.tool.message` span event.
pub fn record_tool_message(tool_use_id: &str) {
    info!(name: "gen_ai.tool.message", tool_use_id);
}

/// Emits the `gen_ai.choice` span event for a completed assistant turn.
pub fn record_choice(stop_reason: &str) {
    info!(name: "gen_ai.choice", stop_reason);
}

/// Records a named metric observation as a structured `tracing` event, the
/// same convention the pack's otel-hook crate uses in place of a bound
/// metrics-API instrument. `unit` follows UCUM-ish short codes (`"s"`,
/// `"ms"`, `"tokens"`, `"1"` for bare counts).
pub fn record_metric(name: &'static str, value: f64, unit: &'static str) {
    info!(metric.name = name, metric.value = value, metric.unit = unit);
}

/// Names of the metric instruments listed in §6, for callers that want a
/// single source of truth instead of string literals scattered through the
/// event loop / tool executor.
pub mod metrics {
    pub const EVENT_LOOP_CYCLE_COUNT: &str = "event_loop.cycle_count";
    pub const EVENT_LOOP_START_CYCLE: &str = "event_loop.start_cycle";
    pub const EVENT_LOOP_END_CYCLE: &str = "event_loop.end_cycle";
    pub const EVENT_LOOP_CYCLE_DURATION: &str = "event_loop.cycle_duration";
    pub const EVENT_LOOP_LATENCY: &str = "event_loop.latency";
    pub const EVENT_LOOP_INPUT_TOKENS: &str = "event_loop.input_tokens";
    pub const EVENT_LOOP_OUTPUT_TOKENS: &str = "event_loop.output_tokens";
    pub const TOOL_CALL_COUNT: &str = "tool.call_count";
    pub const TOOL_SUCCESS_COUNT: &str = "tool.success_count";
    pub const TOOL_ERROR_COUNT: &str = "tool.error_count";
    pub const TOOL_DURATION: &str = "tool.duration";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_can_be_opened_and_entered() {
        let span = invoke_agent_span("test-agent", "qwen3:8b");
        let _guard = span.enter();
        record_user_message();
        record_metric(metrics::TOOL_CALL_COUNT, 1.0, "1");
    }

    #[test]
    fn test_metric_name_constants_are_stable() {
        assert_eq!(metrics::EVENT_LOOP_CYCLE_COUNT, "event_loop.cycle_count");
        assert_eq!(metrics::TOOL_DURATION, "tool.duration");
    }
}
