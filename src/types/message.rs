//! Model-facing conversation messages and prompt standardization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;

/// Model-facing representation of a tool output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ToolResultOutput {
    Text { value: String },
    Json { value: Value },
    ErrorText { value: String },
    ErrorJson { value: Value },
    ExecutionDenied {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// User message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UserContent {
    Text { text: String },
    File {
        #[serde(rename = "mediaType")]
        media_type: String,
        /// Base64 data or URL.
        data: String,
    },
}

/// Assistant message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AssistantContent {
    Text { text: String },
    Reasoning { text: String },
    File {
        #[serde(rename = "mediaType")]
        media_type: String,
        data: String,
    },
    ToolCall {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
        #[serde(rename = "providerExecuted", default, skip_serializing_if = "Option::is_none")]
        provider_executed: Option<bool>,
    },
    /// Result of a provider-executed tool.
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        output: ToolResultOutput,
    },
    ToolApprovalRequest {
        #[serde(rename = "approvalId")]
        approval_id: String,
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
    },
}

/// Tool message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ToolContent {
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        output: ToolResultOutput,
    },
    ToolApprovalResponse {
        #[serde(rename = "approvalId")]
        approval_id: String,
        approved: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// A message in the conversation sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ModelMessage {
    System { content: String },
    User { content: Vec<UserContent> },
    Assistant { content: Vec<AssistantContent> },
    Tool { content: Vec<ToolContent> },
}

impl ModelMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![UserContent::Text { text: text.into() }],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: vec![AssistantContent::Text { text: text.into() }],
        }
    }

    /// Tool message answering approval requests.
    pub fn approval_responses(responses: Vec<(String, bool, Option<String>)>) -> Self {
        Self::Tool {
            content: responses
                .into_iter()
                .map(|(approval_id, approved, reason)| ToolContent::ToolApprovalResponse {
                    approval_id,
                    approved,
                    reason,
                })
                .collect(),
        }
    }
}

/// The immutable input of a run: optional system text plus messages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Prompt {
    pub system: Option<String>,
    pub messages: Vec<ModelMessage>,
}

impl Prompt {
    /// Build a prompt from either a plain text prompt or a message list.
    ///
    /// Exactly one of `prompt` and `messages` must be provided.
    pub fn standardize(
        system: Option<String>,
        prompt: Option<String>,
        messages: Option<Vec<ModelMessage>>,
    ) -> Result<Self, LlmError> {
        let messages = match (prompt, messages) {
            (Some(_), Some(_)) => {
                return Err(LlmError::InvalidPrompt(
                    "prompt and messages cannot be defined at the same time".into(),
                ));
            }
            (None, None) => {
                return Err(LlmError::InvalidPrompt(
                    "prompt or messages must be defined".into(),
                ));
            }
            (Some(text), None) => vec![ModelMessage::user(text)],
            (None, Some(messages)) => messages,
        };
        if messages.is_empty() {
            return Err(LlmError::InvalidPrompt("messages must not be empty".into()));
        }
        Ok(Self { system, messages })
    }

    /// Messages as sent to the model, with the system text prepended.
    pub fn to_model_messages(&self) -> Vec<ModelMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system {
            out.push(ModelMessage::system(system.clone()));
        }
        out.extend(self.messages.iter().cloned());
        out
    }
}
