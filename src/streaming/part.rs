//! The canonical part vocabulary flowing through a run.
//!
//! Every projection (text, partial output, UI chunks) and every consumer
//! callback is derived from this one ordered sequence.

use serde_json::Value;

use crate::error::LlmError;
use crate::types::{
    FinishReason, GeneratedFile, ProviderMetadata, RequestMetadata, ResponseMetadata, Source,
    ToolApprovalRequest, ToolCall, ToolError, ToolResult, Usage, Warning,
};

/// One event of a run.
///
/// Text, reasoning and tool-input parts carry an `id` that scopes their
/// deltas to one logical unit.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    /// First part of every run.
    Start,
    /// Emitted before any content of a step.
    StartStep {
        request: RequestMetadata,
        warnings: Vec<Warning>,
    },
    TextStart {
        id: String,
        provider_metadata: Option<ProviderMetadata>,
    },
    TextDelta {
        id: String,
        text: String,
    },
    TextEnd {
        id: String,
    },
    ReasoningStart {
        id: String,
        provider_metadata: Option<ProviderMetadata>,
    },
    ReasoningDelta {
        id: String,
        text: String,
    },
    ReasoningEnd {
        id: String,
    },
    Source(Source),
    File(GeneratedFile),
    ToolInputStart {
        id: String,
        tool_name: String,
        provider_executed: bool,
        dynamic: bool,
    },
    ToolInputDelta {
        id: String,
        delta: String,
    },
    ToolInputEnd {
        id: String,
    },
    ToolCall(ToolCall),
    /// A tool output. Preliminary results are followed by a final one.
    ToolResult(ToolResult),
    ToolError(ToolError),
    /// The user denied a tool call that needed approval.
    ToolOutputDenied {
        tool_call_id: String,
        tool_name: String,
    },
    ToolApprovalRequest(ToolApprovalRequest),
    FinishStep {
        response: ResponseMetadata,
        usage: Usage,
        finish_reason: FinishReason,
        provider_metadata: Option<ProviderMetadata>,
    },
    /// Terminal part of a successful run.
    Finish {
        finish_reason: FinishReason,
        total_usage: Usage,
    },
    /// Terminal part of a failed run; no `Finish` follows.
    Error {
        error: LlmError,
    },
    /// Terminal part of a cancelled run; no `Finish` follows.
    Abort,
    /// Vendor chunk, forwarded only when raw chunks were requested.
    Raw {
        raw_value: Value,
    },
}

impl StreamPart {
    /// Wire-style tag of this part.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::StartStep { .. } => "start-step",
            Self::TextStart { .. } => "text-start",
            Self::TextDelta { .. } => "text-delta",
            Self::TextEnd { .. } => "text-end",
            Self::ReasoningStart { .. } => "reasoning-start",
            Self::ReasoningDelta { .. } => "reasoning-delta",
            Self::ReasoningEnd { .. } => "reasoning-end",
            Self::Source(_) => "source",
            Self::File(_) => "file",
            Self::ToolInputStart { .. } => "tool-input-start",
            Self::ToolInputDelta { .. } => "tool-input-delta",
            Self::ToolInputEnd { .. } => "tool-input-end",
            Self::ToolCall(_) => "tool-call",
            Self::ToolResult(_) => "tool-result",
            Self::ToolError(_) => "tool-error",
            Self::ToolOutputDenied { .. } => "tool-output-denied",
            Self::ToolApprovalRequest(_) => "tool-approval-request",
            Self::FinishStep { .. } => "finish-step",
            Self::Finish { .. } => "finish",
            Self::Error { .. } => "error",
            Self::Abort => "abort",
            Self::Raw { .. } => "raw",
        }
    }

    /// Parts forwarded to `on_chunk` callbacks.
    pub fn is_chunk(&self) -> bool {
        matches!(
            self,
            Self::TextDelta { .. }
                | Self::ReasoningDelta { .. }
                | Self::Source(_)
                | Self::ToolCall(_)
                | Self::ToolInputStart { .. }
                | Self::ToolInputDelta { .. }
                | Self::ToolResult(_)
                | Self::Raw { .. }
        )
    }

    /// `Finish`, `Error` or `Abort`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. } | Self::Abort)
    }
}
