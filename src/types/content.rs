//! Content produced by a step: text, reasoning, sources, files and the tool
//! call / result / error records joined by `tool_call_id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ProviderMetadata;
use crate::error::LlmError;

/// A citation or reference surfaced by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "sourceType", rename_all = "lowercase")]
pub enum Source {
    Url {
        id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Document {
        id: String,
        #[serde(rename = "mediaType")]
        media_type: String,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

impl Source {
    pub fn id(&self) -> &str {
        match self {
            Self::Url { id, .. } | Self::Document { id, .. } => id,
        }
    }
}

/// A file generated by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedFile {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    /// Base64-encoded file content.
    pub base64: String,
}

impl GeneratedFile {
    /// The file as a `data:` URL.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.base64)
    }
}

/// A tool call after lookup and input validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Parsed input. For invalid calls this is the raw input as a JSON string.
    pub input: Value,
    /// The provider executes this call itself.
    pub provider_executed: bool,
    /// The tool is not part of the statically known tool set.
    pub dynamic: bool,
    /// The call could not be matched or validated.
    pub invalid: bool,
    /// Why the call is invalid.
    pub error: Option<LlmError>,
    pub provider_metadata: Option<ProviderMetadata>,
}

impl ToolCall {
    /// A valid call with the given parsed input.
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
            provider_executed: false,
            dynamic: false,
            invalid: false,
            error: None,
            provider_metadata: None,
        }
    }
}

/// A tool output joined to its call by `tool_call_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub output: Value,
    pub provider_executed: bool,
    pub dynamic: bool,
    /// Intermediate output; the durable result comes later.
    pub preliminary: bool,
}

/// A failed tool call joined to its call by `tool_call_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolError {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub error: LlmError,
    pub provider_executed: bool,
    pub dynamic: bool,
}

/// Request for the user to approve a tool call before it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolApprovalRequest {
    pub approval_id: String,
    pub tool_call: ToolCall,
}

/// One ordered piece of a step's content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text {
        text: String,
        provider_metadata: Option<ProviderMetadata>,
    },
    Reasoning {
        text: String,
        provider_metadata: Option<ProviderMetadata>,
    },
    Source(Source),
    File(GeneratedFile),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    ToolError(ToolError),
    ToolApprovalRequest(ToolApprovalRequest),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            provider_metadata: None,
        }
    }
}
