//! Durable summary of one model call.

use crate::types::{
    ContentPart, FinishReason, GeneratedFile, ModelMessage, ProviderMetadata, RequestMetadata,
    ResponseMetadata, Source, ToolApprovalRequest, ToolCall, ToolError, ToolResult, Usage,
    Warning,
};

/// Response side of a step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepResponse {
    pub metadata: ResponseMetadata,
    /// Response messages accumulated by the run up to and including this step.
    pub messages: Vec<ModelMessage>,
}

/// One completed step, built once from that step's stream parts.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Zero-based, strictly increasing.
    pub step_number: usize,
    /// Content in emission order.
    pub content: Vec<ContentPart>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub warnings: Vec<Warning>,
    pub request: RequestMetadata,
    pub response: StepResponse,
    pub provider_metadata: Option<ProviderMetadata>,
}

impl StepResult {
    /// Concatenated text of the step.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Text of the first text unit, the one structured output is read from.
    pub fn first_text(&self) -> &str {
        self.content
            .iter()
            .find_map(|part| match part {
                ContentPart::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Concatenated reasoning, if the step produced any.
    pub fn reasoning_text(&self) -> Option<String> {
        let mut found = false;
        let text: String = self
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Reasoning { text, .. } => {
                    found = true;
                    Some(text.as_str())
                }
                _ => None,
            })
            .collect();
        found.then_some(text)
    }

    pub fn sources(&self) -> Vec<&Source> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Source(source) => Some(source),
                _ => None,
            })
            .collect()
    }

    pub fn files(&self) -> Vec<&GeneratedFile> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::File(file) => Some(file),
                _ => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn tool_results(&self) -> Vec<&ToolResult> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolResult(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    pub fn tool_errors(&self) -> Vec<&ToolError> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolError(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn approval_requests(&self) -> Vec<&ToolApprovalRequest> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolApprovalRequest(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Whether every locally handled tool call of this step has an output.
    ///
    /// Returns `false` when there are no such calls.
    pub(crate) fn client_tool_calls_settled(&self) -> bool {
        let calls: Vec<&ToolCall> = self
            .tool_calls()
            .into_iter()
            .filter(|call| !call.provider_executed)
            .collect();
        if calls.is_empty() {
            return false;
        }
        calls.iter().all(|call| {
            self.content.iter().any(|part| match part {
                ContentPart::ToolResult(result) => {
                    !result.provider_executed && result.tool_call_id == call.tool_call_id
                }
                ContentPart::ToolError(error) => {
                    !error.provider_executed && error.tool_call_id == call.tool_call_id
                }
                _ => false,
            })
        })
    }
}
