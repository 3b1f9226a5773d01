//! Canonical model interface.
//!
//! Vendor adapters implement [`LanguageModel`]: they translate a
//! [`LanguageModelRequest`] into their wire format and translate the vendor
//! stream back into [`ModelStreamEvent`]s. The step loop only speaks this
//! canonical vocabulary.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;
use crate::types::{
    FinishReason, GeneratedFile, ModelMessage, ProviderMetadata, RequestMetadata,
    ResponseMetadata, Source, Usage, Warning,
};
use crate::utils::CancelHandle;

/// Tool description sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// How the model should pick tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolChoice {
    /// Let the model decide whether to call tools.
    #[default]
    Auto,
    /// Require the model to call at least one tool.
    Required,
    /// Prevent the model from calling any tools.
    None,
    /// Force the model to call a specific tool.
    Tool {
        #[serde(rename = "toolName")]
        tool_name: String,
    },
}

/// Generation settings forwarded to the adapter unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub headers: HashMap<String, String>,
    /// Provider-specific options keyed by provider id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<ProviderMetadata>,
}

impl CallSettings {
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// The canonical request for one model call.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageModelRequest {
    /// Full prompt including the system message.
    pub prompt: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub settings: CallSettings,
    /// Expected shape of the response text.
    pub response_format: Option<ResponseFormat>,
    /// Ask the adapter to emit `Raw` events with vendor chunks.
    pub include_raw_chunks: bool,
}

/// Response format hint derived from the requested output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseFormat {
    Text,
    Json {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

/// A tool call before parsing; `input` is the JSON text produced by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: String,
    pub provider_executed: bool,
    pub provider_metadata: Option<ProviderMetadata>,
}

impl ModelToolCall {
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input: input.into(),
            provider_executed: false,
            provider_metadata: None,
        }
    }
}

/// Canonical events produced by a streaming model call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStreamEvent {
    /// First event of a call, carrying call warnings.
    StreamStart { warnings: Vec<Warning> },
    ResponseMetadata(ResponseMetadata),
    TextStart {
        id: String,
        provider_metadata: Option<ProviderMetadata>,
    },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    ReasoningStart {
        id: String,
        provider_metadata: Option<ProviderMetadata>,
    },
    ReasoningDelta { id: String, delta: String },
    ReasoningEnd { id: String },
    ToolInputStart {
        id: String,
        tool_name: String,
        provider_executed: bool,
    },
    ToolInputDelta { id: String, delta: String },
    ToolInputEnd { id: String },
    /// A complete tool call as produced by the model.
    ToolCall(ModelToolCall),
    /// Result of a tool the provider executed itself.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: Value,
        is_error: bool,
    },
    Source(Source),
    File(GeneratedFile),
    Finish {
        finish_reason: FinishReason,
        usage: Usage,
        provider_metadata: Option<ProviderMetadata>,
    },
    Error { error: LlmError },
    Raw { raw_value: Value },
}

/// Stream of canonical model events.
pub type ModelEventStream =
    Pin<Box<dyn Stream<Item = Result<ModelStreamEvent, LlmError>> + Send>>;

/// Result of starting a streaming model call.
pub struct ModelStreamResponse {
    pub stream: ModelEventStream,
    pub request: RequestMetadata,
    /// Response headers known at handshake time.
    pub response_headers: HashMap<String, String>,
}

impl ModelStreamResponse {
    pub fn new(stream: ModelEventStream) -> Self {
        Self {
            stream,
            request: RequestMetadata::default(),
            response_headers: HashMap::new(),
        }
    }
}

/// A language model adapter.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider id, e.g. `"openai"`.
    fn provider(&self) -> &str;

    /// Model id, e.g. `"gpt-4o"`.
    fn model_id(&self) -> &str;

    /// Start a streaming call. Handshake failures are returned as `Err`;
    /// failures after the stream started surface as `Err` items or
    /// [`ModelStreamEvent::Error`].
    async fn do_stream(
        &self,
        request: LanguageModelRequest,
        cancel: CancelHandle,
    ) -> Result<ModelStreamResponse, LlmError>;
}
