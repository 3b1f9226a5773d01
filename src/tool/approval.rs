//! Resuming runs that stopped on tool approval requests.
//!
//! A run that hit a tool needing approval ends with a `tool-approval-request`.
//! The caller answers by appending a tool message with approval responses and
//! starting a new run; that run executes the approved calls and denies the
//! rest before its first step.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::{ToolOutput, ToolSet, create_tool_error_output, create_tool_model_output};
use crate::error::LlmError;
use crate::types::{AssistantContent, ModelMessage, ToolCall, ToolContent, ToolResultOutput};

/// A call the user answered.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedApproval {
    pub approval_id: String,
    pub tool_call: ToolCall,
    pub reason: Option<String>,
}

/// Approval answers found at the end of a conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApprovedToolCalls {
    pub approved: Vec<CollectedApproval>,
    pub denied: Vec<CollectedApproval>,
}

impl ApprovedToolCalls {
    pub fn is_empty(&self) -> bool {
        self.approved.is_empty() && self.denied.is_empty()
    }
}

/// Collect unanswered approval responses from the trailing tool message.
///
/// Responses whose call already has a result are skipped. A response that
/// points at an unknown approval request is an [`LlmError::InvalidPrompt`].
pub fn collect_tool_approvals(messages: &[ModelMessage]) -> Result<ApprovedToolCalls, LlmError> {
    let Some(ModelMessage::Tool { content: last }) = messages.last() else {
        return Ok(ApprovedToolCalls::default());
    };

    let mut calls: HashMap<&str, (&str, &Value)> = HashMap::new();
    let mut requests: HashMap<&str, &str> = HashMap::new();
    let mut answered: HashSet<&str> = HashSet::new();
    for message in messages {
        match message {
            ModelMessage::Assistant { content } => {
                for part in content {
                    match part {
                        AssistantContent::ToolCall {
                            tool_call_id,
                            tool_name,
                            input,
                            ..
                        } => {
                            calls.insert(tool_call_id.as_str(), (tool_name.as_str(), input));
                        }
                        AssistantContent::ToolApprovalRequest {
                            approval_id,
                            tool_call_id,
                        } => {
                            requests.insert(approval_id.as_str(), tool_call_id.as_str());
                        }
                        _ => {}
                    }
                }
            }
            ModelMessage::Tool { content } => {
                for part in content {
                    if let ToolContent::ToolResult { tool_call_id, .. } = part {
                        answered.insert(tool_call_id.as_str());
                    }
                }
            }
            _ => {}
        }
    }

    let mut collected = ApprovedToolCalls::default();
    for part in last {
        let ToolContent::ToolApprovalResponse {
            approval_id,
            approved,
            reason,
        } = part
        else {
            continue;
        };
        let Some(tool_call_id) = requests.get(approval_id.as_str()).copied() else {
            return Err(LlmError::InvalidPrompt(format!(
                "tool approval response references unknown approval id '{approval_id}'"
            )));
        };
        if answered.contains(tool_call_id) {
            continue;
        }
        let Some((tool_name, input)) = calls.get(tool_call_id).copied() else {
            return Err(LlmError::InvalidPrompt(format!(
                "tool call '{tool_call_id}' for approval '{approval_id}' not found"
            )));
        };
        let approval = CollectedApproval {
            approval_id: approval_id.clone(),
            tool_call: ToolCall::new(tool_call_id, tool_name, input.clone()),
            reason: reason.clone(),
        };
        if *approved {
            collected.approved.push(approval);
        } else {
            collected.denied.push(approval);
        }
    }
    Ok(collected)
}

/// Tool message carrying the outputs of approved calls and the denials.
pub(crate) fn approval_outputs_message(
    outputs: &[ToolOutput],
    denied: &[CollectedApproval],
    tools: &ToolSet,
) -> Option<ModelMessage> {
    let mut content: Vec<ToolContent> = outputs
        .iter()
        .map(|output| match output {
            ToolOutput::Result(result) => ToolContent::ToolResult {
                tool_call_id: result.tool_call_id.clone(),
                tool_name: result.tool_name.clone(),
                output: create_tool_model_output(&result.output, tools.get(&result.tool_name)),
            },
            ToolOutput::Error(error) => ToolContent::ToolResult {
                tool_call_id: error.tool_call_id.clone(),
                tool_name: error.tool_name.clone(),
                output: create_tool_error_output(&error.error),
            },
        })
        .collect();
    content.extend(denied.iter().map(|approval| ToolContent::ToolResult {
        tool_call_id: approval.tool_call.tool_call_id.clone(),
        tool_name: approval.tool_call.tool_name.clone(),
        output: ToolResultOutput::ExecutionDenied {
            reason: approval.reason.clone(),
        },
    }));
    (!content.is_empty()).then_some(ModelMessage::Tool { content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conversation(responses: Vec<(String, bool, Option<String>)>) -> Vec<ModelMessage> {
        vec![
            ModelMessage::user("delete my files"),
            ModelMessage::Assistant {
                content: vec![
                    AssistantContent::ToolCall {
                        tool_call_id: "call-1".into(),
                        tool_name: "delete".into(),
                        input: json!({"path": "/tmp/a"}),
                        provider_executed: None,
                    },
                    AssistantContent::ToolApprovalRequest {
                        approval_id: "approval-1".into(),
                        tool_call_id: "call-1".into(),
                    },
                    AssistantContent::ToolCall {
                        tool_call_id: "call-2".into(),
                        tool_name: "delete".into(),
                        input: json!({"path": "/etc"}),
                        provider_executed: None,
                    },
                    AssistantContent::ToolApprovalRequest {
                        approval_id: "approval-2".into(),
                        tool_call_id: "call-2".into(),
                    },
                ],
            },
            ModelMessage::approval_responses(responses),
        ]
    }

    #[test]
    fn splits_approved_and_denied() {
        let messages = conversation(vec![
            ("approval-1".into(), true, None),
            ("approval-2".into(), false, Some("too dangerous".into())),
        ]);
        let collected = collect_tool_approvals(&messages).unwrap();
        assert_eq!(collected.approved.len(), 1);
        assert_eq!(collected.approved[0].tool_call.input, json!({"path": "/tmp/a"}));
        assert_eq!(collected.denied[0].reason.as_deref(), Some("too dangerous"));
    }

    #[test]
    fn no_trailing_tool_message_means_nothing_to_do() {
        let messages = vec![ModelMessage::user("hi")];
        assert!(collect_tool_approvals(&messages).unwrap().is_empty());
    }

    #[test]
    fn unknown_approval_id_is_rejected() {
        let messages = conversation(vec![("approval-9".into(), true, None)]);
        assert!(matches!(
            collect_tool_approvals(&messages),
            Err(LlmError::InvalidPrompt(_))
        ));
    }

    #[test]
    fn denied_calls_become_execution_denied_outputs() {
        let denied = vec![CollectedApproval {
            approval_id: "approval-2".into(),
            tool_call: ToolCall::new("call-2", "delete", json!({})),
            reason: None,
        }];
        let message = approval_outputs_message(&[], &denied, &ToolSet::new()).unwrap();
        match message {
            ModelMessage::Tool { content } => assert!(matches!(
                &content[0],
                ToolContent::ToolResult { output: ToolResultOutput::ExecutionDenied { .. }, .. }
            )),
            other => panic!("unexpected message {other:?}"),
        }
        assert!(approval_outputs_message(&[], &[], &ToolSet::new()).is_none());
    }
}
