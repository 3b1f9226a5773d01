//! Dispatch and execution of parsed tool calls.

use futures::StreamExt;
use serde_json::Value;
use tracing::debug;

use super::{Tool, ToolCallOptions, ToolExecution, ToolSet};
use crate::error::LlmError;
use crate::streaming::{PartStream, StreamPart};
use crate::types::{ToolApprovalRequest, ToolCall, ToolError, ToolResult};
use crate::utils::IdGenerator;

/// What to do with a parsed call.
pub enum ToolDispatch {
    /// The call could not be matched or validated.
    Invalid(ToolError),
    /// The provider runs the tool and streams its result.
    ProviderExecuted,
    /// No local `execute`; the caller resolves the call.
    ClientSide,
    /// The user must approve the call first.
    NeedsApproval(ToolApprovalRequest),
    /// Run locally with this tool.
    Execute(Tool),
}

/// Decide how `call` is handled.
pub fn dispatch_tool_call(call: &ToolCall, tools: &ToolSet, generate_id: &IdGenerator) -> ToolDispatch {
    if call.invalid {
        let error = call.error.clone().unwrap_or_else(|| {
            LlmError::InvalidToolInput {
                tool_name: call.tool_name.clone(),
                input: call.input.to_string(),
                message: "invalid tool call".into(),
            }
        });
        return ToolDispatch::Invalid(tool_error(call, error));
    }
    if call.provider_executed {
        return ToolDispatch::ProviderExecuted;
    }
    let Some(tool) = tools.get(&call.tool_name) else {
        return ToolDispatch::ClientSide;
    };
    if tool.needs_approval(&call.input) {
        return ToolDispatch::NeedsApproval(ToolApprovalRequest {
            approval_id: generate_id(),
            tool_call: call.clone(),
        });
    }
    if !tool.is_executable() {
        return ToolDispatch::ClientSide;
    }
    ToolDispatch::Execute(tool.clone())
}

/// Final outcome of one executed call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Result(ToolResult),
    Error(ToolError),
}

impl ToolOutput {
    pub fn tool_call_id(&self) -> &str {
        match self {
            Self::Result(result) => &result.tool_call_id,
            Self::Error(error) => &error.tool_call_id,
        }
    }
}

/// Run `call` and wait for its final output.
///
/// Returns `None` for calls that are not executed locally (provider-executed,
/// client-side, or awaiting approval) and when the run is cancelled first.
pub async fn execute_tool_call(
    call: &ToolCall,
    tools: &ToolSet,
    options: ToolCallOptions,
) -> Option<ToolOutput> {
    let tool = match dispatch_tool_call(call, tools, &crate::utils::create_id_generator("aitool")) {
        ToolDispatch::Invalid(error) => return Some(ToolOutput::Error(error)),
        ToolDispatch::ProviderExecuted
        | ToolDispatch::ClientSide
        | ToolDispatch::NeedsApproval(_) => return None,
        ToolDispatch::Execute(tool) => tool,
    };

    let mut parts = tool_output_stream(call.clone(), tool, options);
    let mut output = None;
    while let Some(part) = parts.next().await {
        match part {
            StreamPart::ToolResult(result) if !result.preliminary => {
                output = Some(ToolOutput::Result(result))
            }
            StreamPart::ToolError(error) => output = Some(ToolOutput::Error(error)),
            _ => {}
        }
    }
    output
}

/// Execute `call` with `tool`, streaming its outputs as parts.
///
/// Streaming executors surface every item as a preliminary `ToolResult`,
/// followed by a final one repeating the last item (`null` when the stream
/// was empty). Failures become a `ToolError`. Cancellation ends the stream
/// without an output.
pub fn tool_output_stream(call: ToolCall, tool: Tool, options: ToolCallOptions) -> PartStream {
    Box::pin(async_stream::stream! {
        let Some(executor) = tool.executor().cloned() else {
            return;
        };
        let cancel = options.cancel.clone();
        debug!(tool_name = %call.tool_name, tool_call_id = %call.tool_call_id, "executing tool");

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            started = executor.execute(call.input.clone(), options) => Some(started),
        };
        let Some(started) = started else {
            debug!(tool_call_id = %call.tool_call_id, "tool execution cancelled");
            return;
        };

        match started {
            Err(error) => {
                yield StreamPart::ToolError(tool_error(&call, error));
            }
            Ok(ToolExecution::Output(output)) => {
                yield StreamPart::ToolResult(tool_result(&call, output, false));
            }
            Ok(ToolExecution::Streaming(mut outputs)) => {
                let mut last = Value::Null;
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        item = outputs.next() => Some(item),
                    };
                    match next {
                        None => return,
                        Some(None) => break,
                        Some(Some(Ok(value))) => {
                            yield StreamPart::ToolResult(tool_result(&call, value.clone(), true));
                            last = value;
                        }
                        Some(Some(Err(error))) => {
                            yield StreamPart::ToolError(tool_error(&call, error));
                            return;
                        }
                    }
                }
                yield StreamPart::ToolResult(tool_result(&call, last, false));
            }
        }
    })
}

fn tool_result(call: &ToolCall, output: Value, preliminary: bool) -> ToolResult {
    ToolResult {
        tool_call_id: call.tool_call_id.clone(),
        tool_name: call.tool_name.clone(),
        input: call.input.clone(),
        output,
        provider_executed: false,
        dynamic: call.dynamic,
        preliminary,
    }
}

pub(crate) fn tool_error(call: &ToolCall, error: LlmError) -> ToolError {
    let error = match error {
        LlmError::ToolExecutionError { .. }
        | LlmError::NoSuchTool { .. }
        | LlmError::InvalidToolInput { .. } => error,
        other => LlmError::ToolExecutionError {
            tool_name: call.tool_name.clone(),
            tool_call_id: call.tool_call_id.clone(),
            message: other.to_string(),
        },
    };
    ToolError {
        tool_call_id: call.tool_call_id.clone(),
        tool_name: call.tool_name.clone(),
        input: call.input.clone(),
        error,
        provider_executed: call.provider_executed,
        dynamic: call.dynamic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{CancelHandle, sequential_id_generator};
    use serde_json::json;

    fn options(cancel: CancelHandle) -> ToolCallOptions {
        ToolCallOptions {
            tool_call_id: "c1".into(),
            messages: vec![],
            cancel,
            context: None,
        }
    }

    fn tools() -> ToolSet {
        ToolSet::new()
            .with_tool(
                "getItemId",
                Tool::new(json!({})).with_execute(|_, _| async { Ok(json!("item_1")) }),
            )
            .with_tool(
                "fails",
                Tool::new(json!({})).with_execute(|_, _| async {
                    Err(LlmError::InternalError("db down".into()))
                }),
            )
            .with_tool(
                "progress",
                Tool::new(json!({})).with_streaming_execute(|_, _| {
                    futures::stream::iter(vec![Ok(json!({"pct": 50})), Ok(json!({"pct": 100}))])
                }),
            )
            .with_tool("client", Tool::new(json!({})))
            .with_tool(
                "guarded",
                Tool::new(json!({}))
                    .with_needs_approval(true)
                    .with_execute(|_, _| async { Ok(json!(1)) }),
            )
    }

    #[tokio::test]
    async fn executes_and_returns_final_output() {
        let call = ToolCall::new("c1", "getItemId", json!({}));
        let output = execute_tool_call(&call, &tools(), options(CancelHandle::new())).await;
        match output {
            Some(ToolOutput::Result(result)) => {
                assert_eq!(result.output, json!("item_1"));
                assert!(!result.preliminary);
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failures_become_tool_errors() {
        let call = ToolCall::new("c1", "fails", json!({}));
        let output = execute_tool_call(&call, &tools(), options(CancelHandle::new())).await;
        match output {
            Some(ToolOutput::Error(error)) => {
                assert!(matches!(error.error, LlmError::ToolExecutionError { .. }));
                assert!(error.error.to_string().contains("db down"));
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn streaming_tool_emits_preliminary_then_final() {
        let call = ToolCall::new("c1", "progress", json!({}));
        let tool = tools().get("progress").cloned().unwrap();
        let parts: Vec<_> = tool_output_stream(call, tool, options(CancelHandle::new()))
            .collect()
            .await;
        let flags: Vec<_> = parts
            .iter()
            .map(|part| match part {
                StreamPart::ToolResult(r) => (r.preliminary, r.output["pct"].as_u64()),
                other => panic!("unexpected part {other:?}"),
            })
            .collect();
        assert_eq!(flags, vec![(true, Some(50)), (true, Some(100)), (false, Some(100))]);
    }

    #[tokio::test]
    async fn cancelled_execution_yields_nothing() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        let call = ToolCall::new("c1", "getItemId", json!({}));
        let output = execute_tool_call(&call, &tools(), options(cancel)).await;
        assert!(output.is_none());
    }

    #[test]
    fn dispatch_variants() {
        let ids = sequential_id_generator("approval");
        let tools = tools();

        let client = ToolCall::new("c1", "client", json!({}));
        assert!(matches!(dispatch_tool_call(&client, &tools, &ids), ToolDispatch::ClientSide));

        let mut provider = ToolCall::new("c2", "web_search", json!({}));
        provider.provider_executed = true;
        assert!(matches!(dispatch_tool_call(&provider, &tools, &ids), ToolDispatch::ProviderExecuted));

        let guarded = ToolCall::new("c3", "guarded", json!({}));
        match dispatch_tool_call(&guarded, &tools, &ids) {
            ToolDispatch::NeedsApproval(request) => assert_eq!(request.approval_id, "approval-0"),
            _ => panic!("expected approval request"),
        }

        let mut invalid = ToolCall::new("c4", "missing", json!({}));
        invalid.invalid = true;
        assert!(matches!(dispatch_tool_call(&invalid, &tools, &ids), ToolDispatch::Invalid(_)));

        let runnable = ToolCall::new("c5", "getItemId", json!({}));
        assert!(matches!(dispatch_tool_call(&runnable, &tools, &ids), ToolDispatch::Execute(_)));
    }
}
