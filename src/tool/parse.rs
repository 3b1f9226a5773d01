//! Turning a raw model tool call into a validated [`ToolCall`].

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use super::ToolSet;
use crate::error::LlmError;
use crate::model::{ModelToolCall, ToolDefinition};
use crate::types::{ModelMessage, ToolCall};

/// Everything a repair hook needs to fix a bad call.
#[derive(Debug, Clone)]
pub struct RepairRequest {
    pub tool_call: ModelToolCall,
    /// Why the call failed: [`LlmError::NoSuchTool`] or [`LlmError::InvalidToolInput`].
    pub error: LlmError,
    pub system: Option<String>,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
    pub context: Option<Value>,
}

/// Repair hook. `Ok(None)` gives up and keeps the original failure.
pub type RepairToolCallFn =
    Arc<dyn Fn(RepairRequest) -> BoxFuture<'static, Result<Option<ModelToolCall>, LlmError>> + Send + Sync>;

/// Parse and validate `call` against `tools`, offering failures to `repair`.
///
/// Never fails: an unusable call comes back with `invalid = true` and the
/// reason in `error`.
pub async fn parse_tool_call(
    call: ModelToolCall,
    tools: &ToolSet,
    repair: Option<&RepairToolCallFn>,
    system: Option<&str>,
    messages: &[ModelMessage],
    context: Option<&Value>,
) -> ToolCall {
    let error = match parse_against(&call, tools) {
        Ok(parsed) => return parsed,
        Err(error) => error,
    };

    let Some(repair) = repair else {
        return invalid_call(call, error);
    };

    debug!(tool_name = %call.tool_name, error = %error, "attempting tool call repair");
    let request = RepairRequest {
        tool_call: call.clone(),
        error: error.clone(),
        system: system.map(str::to_string),
        messages: messages.to_vec(),
        tools: tools.definitions(),
        context: context.cloned(),
    };
    match repair(request).await {
        Ok(Some(repaired)) => match parse_against(&repaired, tools) {
            Ok(parsed) => parsed,
            Err(still_invalid) => invalid_call(repaired, still_invalid),
        },
        Ok(None) => invalid_call(call, error),
        Err(repair_error) => {
            warn!(tool_name = %call.tool_name, error = %repair_error, "tool call repair failed");
            invalid_call(call, repair_error)
        }
    }
}

fn parse_against(call: &ModelToolCall, tools: &ToolSet) -> Result<ToolCall, LlmError> {
    let tool = tools.get(&call.tool_name);

    // Provider-executed tools may be unknown locally.
    if tool.is_none() && call.provider_executed {
        let input = parse_input(&call.input).unwrap_or_else(|_| Value::String(call.input.clone()));
        return Ok(ToolCall {
            dynamic: true,
            ..build(call, input)
        });
    }

    let Some(tool) = tool else {
        return Err(LlmError::NoSuchTool {
            tool_name: call.tool_name.clone(),
            available: tools.names(),
        });
    };

    let input = parse_input(&call.input).map_err(|e| LlmError::InvalidToolInput {
        tool_name: call.tool_name.clone(),
        input: call.input.clone(),
        message: e.to_string(),
    })?;

    tool.validate_input(&input)
        .map_err(|message| LlmError::InvalidToolInput {
            tool_name: call.tool_name.clone(),
            input: call.input.clone(),
            message,
        })?;

    Ok(build(call, input))
}

/// Empty input text means "no arguments".
fn parse_input(text: &str) -> Result<Value, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(text)
}

fn build(call: &ModelToolCall, input: Value) -> ToolCall {
    ToolCall {
        tool_call_id: call.tool_call_id.clone(),
        tool_name: call.tool_name.clone(),
        input,
        provider_executed: call.provider_executed,
        dynamic: false,
        invalid: false,
        error: None,
        provider_metadata: call.provider_metadata.clone(),
    }
}

fn invalid_call(call: ModelToolCall, error: LlmError) -> ToolCall {
    let input = parse_input(&call.input).unwrap_or_else(|_| Value::String(call.input.clone()));
    ToolCall {
        dynamic: true,
        invalid: true,
        error: Some(error),
        ..build(&call, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::Tool;
    use futures::FutureExt;
    use serde_json::json;

    fn tools() -> ToolSet {
        ToolSet::new().with_tool(
            "getItemId",
            Tool::new(json!({
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "required": ["name"]
            })),
        )
    }

    #[tokio::test]
    async fn valid_call_parses() {
        let call = ModelToolCall::new("c1", "getItemId", r#"{"name":"lamp"}"#);
        let parsed = parse_tool_call(call, &tools(), None, None, &[], None).await;
        assert!(!parsed.invalid);
        assert_eq!(parsed.input, json!({"name": "lamp"}));
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid() {
        let call = ModelToolCall::new("c1", "nope", "{}");
        let parsed = parse_tool_call(call, &tools(), None, None, &[], None).await;
        assert!(parsed.invalid);
        assert!(matches!(parsed.error, Some(LlmError::NoSuchTool { .. })));
    }

    #[tokio::test]
    async fn schema_violation_is_invalid() {
        let call = ModelToolCall::new("c1", "getItemId", r#"{"id": 3}"#);
        let parsed = parse_tool_call(call, &tools(), None, None, &[], None).await;
        assert!(parsed.invalid);
        assert!(matches!(parsed.error, Some(LlmError::InvalidToolInput { .. })));
        assert_eq!(parsed.input, json!({"id": 3}));
    }

    #[tokio::test]
    async fn malformed_json_keeps_raw_text() {
        let call = ModelToolCall::new("c1", "getItemId", "{not json");
        let parsed = parse_tool_call(call, &tools(), None, None, &[], None).await;
        assert!(parsed.invalid);
        assert_eq!(parsed.input, json!("{not json"));
    }

    #[tokio::test]
    async fn repair_hook_fixes_input() {
        let repair: RepairToolCallFn = Arc::new(|request: RepairRequest| {
            async move {
                let mut fixed = request.tool_call;
                fixed.input = r#"{"name":"lamp"}"#.to_string();
                Ok::<_, LlmError>(Some(fixed))
            }
            .boxed()
        });
        let call = ModelToolCall::new("c1", "getItemId", r#"{"nam":"lamp"}"#);
        let parsed = parse_tool_call(call, &tools(), Some(&repair), None, &[], None).await;
        assert!(!parsed.invalid);
        assert_eq!(parsed.input["name"], "lamp");
    }

    #[tokio::test]
    async fn repair_giving_up_keeps_original_error() {
        let repair: RepairToolCallFn = Arc::new(|_: RepairRequest| async { Ok::<Option<ModelToolCall>, LlmError>(None) }.boxed());
        let call = ModelToolCall::new("c1", "nope", "{}");
        let parsed = parse_tool_call(call, &tools(), Some(&repair), None, &[], None).await;
        assert!(matches!(parsed.error, Some(LlmError::NoSuchTool { .. })));
    }

    #[tokio::test]
    async fn empty_input_means_no_arguments() {
        let tools = ToolSet::new().with_tool("ping", Tool::new(json!({"type": "object"})));
        let call = ModelToolCall::new("c1", "ping", "");
        let parsed = parse_tool_call(call, &tools, None, None, &[], None).await;
        assert!(!parsed.invalid);
        assert_eq!(parsed.input, json!({}));
    }
}
