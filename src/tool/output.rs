//! Shaping raw tool outputs into model-facing outputs.

use serde_json::Value;

use super::Tool;
use crate::error::LlmError;
use crate::types::ToolResultOutput;

/// Model-facing output of a successful call.
///
/// Uses the tool's mapper when it has one. Otherwise strings pass through as
/// text and anything else is sent as JSON (`null` included).
pub fn create_tool_model_output(output: &Value, tool: Option<&Tool>) -> ToolResultOutput {
    if let Some(mapper) = tool.and_then(Tool::to_model_output_fn) {
        return mapper(output);
    }
    match output {
        Value::String(text) => ToolResultOutput::Text {
            value: text.clone(),
        },
        other => ToolResultOutput::Json {
            value: other.clone(),
        },
    }
}

/// Model-facing output of a failed call.
pub fn create_tool_error_output(error: &LlmError) -> ToolResultOutput {
    ToolResultOutput::ErrorText {
        value: error.to_string(),
    }
}
