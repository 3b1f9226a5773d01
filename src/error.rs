//! Error handling types for stepstream.
//!
//! Every failure that can surface from a run is an [`LlmError`]. The type is
//! `Clone + PartialEq` because errors travel inside stream parts, deferred
//! handles and teed streams, which all hand out copies.

use thiserror::Error;

use crate::types::{FinishReason, ResponseMetadata, Usage};

/// Context attached to structured output failures.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputErrorContext {
    /// Response metadata of the final step.
    pub response: ResponseMetadata,
    /// Usage of the final step.
    pub usage: Usage,
    /// Finish reason of the final step.
    pub finish_reason: FinishReason,
}

/// Unified error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Error reported by the model provider.
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Error while reading or producing a stream.
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Failed to parse a payload.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    JsonError(String),

    /// Invalid caller input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The prompt could not be standardized.
    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Rate limited: {0}")]
    RateLimitError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A tool's `execute` failed.
    #[error("Error executing tool {tool_name} ({tool_call_id}): {message}")]
    ToolExecutionError {
        tool_name: String,
        tool_call_id: String,
        message: String,
    },

    /// The model called a tool that is not available.
    #[error("Model tried to call unavailable tool '{tool_name}'. Available tools: {}", available.join(", "))]
    NoSuchTool {
        tool_name: String,
        available: Vec<String>,
    },

    /// The model produced input that does not satisfy the tool's schema.
    #[error("Invalid input for tool {tool_name}: {message}")]
    InvalidToolInput {
        tool_name: String,
        input: String,
        message: String,
    },

    /// The final text is not valid JSON for the requested output.
    #[error("No object generated: could not parse the response: {message}")]
    OutputParseError {
        text: String,
        message: String,
        context: Box<OutputErrorContext>,
    },

    /// The final text parsed but failed validation.
    #[error("No object generated: response did not match schema: {message}")]
    OutputValidationError {
        text: String,
        message: String,
        context: Box<OutputErrorContext>,
    },

    /// The run finished without recording a single step.
    #[error("No output generated. Check the stream for errors.")]
    NoOutputGenerated,

    /// The run was cancelled.
    #[error("The operation was aborted")]
    Aborted,
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimitError(_) | Self::TimeoutError(_) | Self::ConnectionError(_) => true,
            Self::ApiError { code, .. } => *code == 408 || *code == 409 || *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Convenience constructor for provider errors.
    pub fn api(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}
