//! Structured output adapter (§4.9).
//!
//! Coerces a model into emitting one validated, strongly-typed value by
//! injecting a synthetic tool spec (`structured_output` by default) into the
//! tool specs passed for a single invocation, without mutating the agent's
//! real [`crate::tools::ToolRegistry`]. A declarative record schema here is
//! any Rust type implementing [`StructuredOutputModel`]; `input_schema` is
//! derived via `schemars::schema_for!` and validation is "deserialize the
//! tool_use input into `T`".

use crate::error::{Error, Result};
use crate::types::ToolSpec;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The fixed name of the synthetic tool injected for structured-output
/// invocations.
pub const STRUCTURED_OUTPUT_TOOL_NAME: &str = "structured_output";

/// A declarative record schema: any type the caller wants the model to
/// populate and return as `AgentResult.structured_output`.
pub trait StructuredOutputModel: JsonSchema + DeserializeOwned + Send + Sync + 'static {}

impl<T> StructuredOutputModel for T where T: JsonSchema + DeserializeOwned + Send + Sync + 'static {}

/// Builds the synthetic [`ToolSpec`] injected into the model call for one
/// invocation carrying a `structured_output_model`.
pub fn synthetic_tool_spec<T: StructuredOutputModel>(description: &str) -> ToolSpec {
    let schema = schemars::schema_for!(T);
    ToolSpec {
        name: STRUCTURED_OUTPUT_TOOL_NAME.to_string(),
        description: description.to_string(),
        input_schema: serde_json::to_value(schema).unwrap_or(Value::Null),
    }
}

/// Validates a `tool_use.input` payload against `T`, returning the
/// deserialized record or a [`Error::StructuredOutput`] with the validator's
/// detail.
pub fn validate<T: StructuredOutputModel>(input: &Value) -> Result<T> {
    serde_json::from_value(input.clone())
        .map_err(|e| Error::structured_output(format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize, JsonSchema)]
    struct PersonInfo {
        name: String,
        age: u32,
        occupation: String,
    }

    #[test]
    fn test_synthetic_tool_spec_has_fixed_name() {
        let spec = synthetic_tool_spec::<PersonInfo>("extract person info");
        assert_eq!(spec.name, STRUCTURED_OUTPUT_TOOL_NAME);
        assert!(spec.input_schema.is_object());
    }

    #[test]
    fn test_validate_accepts_matching_shape_s6() {
        let input = serde_json::json!({
            "name": "John Smith",
            "age": 30,
            "occupation": "software engineer",
        });
        let parsed: PersonInfo = validate(&input).unwrap();
        assert_eq!(
            parsed,
            PersonInfo {
                name: "John Smith".into(),
                age: 30,
                occupation: "software engineer".into(),
            }
        );
    }

    #[test]
    fn test_validate_rejects_missing_field() {
        let input = serde_json::json!({ "name": "John Smith" });
        let result: Result<PersonInfo> = validate(&input);
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), Error::StructuredOutput(_)));
    }
}
