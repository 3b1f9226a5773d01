//! Conversion of step content into the messages appended to the history.

use crate::tool::{ToolSet, create_tool_error_output, create_tool_model_output};
use crate::types::{AssistantContent, ContentPart, ModelMessage, ToolContent};

/// Messages describing one step: an assistant message with the model's
/// content, followed by a tool message with locally produced tool outputs.
/// Either is omitted when empty. Sources are not part of the history.
pub fn to_response_messages(content: &[ContentPart], tools: &ToolSet) -> Vec<ModelMessage> {
    let mut assistant = Vec::new();
    let mut tool = Vec::new();

    for part in content {
        match part {
            ContentPart::Text { text, .. } if !text.is_empty() => {
                assistant.push(AssistantContent::Text { text: text.clone() });
            }
            ContentPart::Text { .. } | ContentPart::Source(_) => {}
            ContentPart::Reasoning { text, .. } => {
                assistant.push(AssistantContent::Reasoning { text: text.clone() });
            }
            ContentPart::File(file) => assistant.push(AssistantContent::File {
                media_type: file.media_type.clone(),
                data: file.base64.clone(),
            }),
            ContentPart::ToolCall(call) => assistant.push(AssistantContent::ToolCall {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                input: call.input.clone(),
                provider_executed: call.provider_executed.then_some(true),
            }),
            ContentPart::ToolApprovalRequest(request) => {
                assistant.push(AssistantContent::ToolApprovalRequest {
                    approval_id: request.approval_id.clone(),
                    tool_call_id: request.tool_call.tool_call_id.clone(),
                })
            }
            ContentPart::ToolResult(result) => {
                let output = create_tool_model_output(&result.output, tools.get(&result.tool_name));
                if result.provider_executed {
                    assistant.push(AssistantContent::ToolResult {
                        tool_call_id: result.tool_call_id.clone(),
                        tool_name: result.tool_name.clone(),
                        output,
                    });
                } else {
                    tool.push(ToolContent::ToolResult {
                        tool_call_id: result.tool_call_id.clone(),
                        tool_name: result.tool_name.clone(),
                        output,
                    });
                }
            }
            ContentPart::ToolError(error) => {
                let output = create_tool_error_output(&error.error);
                if error.provider_executed {
                    assistant.push(AssistantContent::ToolResult {
                        tool_call_id: error.tool_call_id.clone(),
                        tool_name: error.tool_name.clone(),
                        output,
                    });
                } else {
                    tool.push(ToolContent::ToolResult {
                        tool_call_id: error.tool_call_id.clone(),
                        tool_name: error.tool_name.clone(),
                        output,
                    });
                }
            }
        }
    }

    let mut messages = Vec::new();
    if !assistant.is_empty() {
        messages.push(ModelMessage::Assistant { content: assistant });
    }
    if !tool.is_empty() {
        messages.push(ModelMessage::Tool { content: tool });
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Source, ToolCall, ToolResult, ToolResultOutput};
    use serde_json::json;

    #[test]
    fn text_only_step_yields_one_assistant_message() {
        let messages = to_response_messages(
            &[
                ContentPart::text("4"),
                ContentPart::text(""),
                ContentPart::Source(Source::Url {
                    id: "s".into(),
                    url: "https://example.com".into(),
                    title: None,
                }),
            ],
            &ToolSet::new(),
        );
        assert_eq!(messages, vec![ModelMessage::assistant("4")]);
    }

    #[test]
    fn tool_step_yields_assistant_then_tool_message() {
        let content = vec![
            ContentPart::ToolCall(ToolCall::new("call-1", "getItemId", json!({}))),
            ContentPart::ToolResult(ToolResult {
                tool_call_id: "call-1".into(),
                tool_name: "getItemId".into(),
                input: json!({}),
                output: json!("item_1"),
                provider_executed: false,
                dynamic: false,
                preliminary: false,
            }),
        ];
        let messages = to_response_messages(&content, &ToolSet::new());
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], ModelMessage::Assistant { content } if content.len() == 1));
        match &messages[1] {
            ModelMessage::Tool { content } => assert_eq!(
                content[0],
                ToolContent::ToolResult {
                    tool_call_id: "call-1".into(),
                    tool_name: "getItemId".into(),
                    output: ToolResultOutput::Text {
                        value: "item_1".into()
                    },
                }
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn provider_executed_results_stay_in_the_assistant_message() {
        let mut call = ToolCall::new("ws-1", "web_search", json!({"q": "rust"}));
        call.provider_executed = true;
        let content = vec![
            ContentPart::ToolCall(call),
            ContentPart::ToolResult(ToolResult {
                tool_call_id: "ws-1".into(),
                tool_name: "web_search".into(),
                input: json!({}),
                output: json!({"hits": 3}),
                provider_executed: true,
                dynamic: true,
                preliminary: false,
            }),
        ];
        let messages = to_response_messages(&content, &ToolSet::new());
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], ModelMessage::Assistant { content } if content.len() == 2));
    }
}
