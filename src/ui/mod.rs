//! UI message stream: the wire projection of a run.
//!
//! Every [`StreamPart`] maps to at most one [`UiMessageChunk`] through the
//! stateless [`to_ui_message_chunk`]. Chunks are serialized as server-sent
//! events (`data: <json>\n\n`) and the stream always ends with
//! `data: [DONE]\n\n`, whether the run finished, failed or was aborted.
//!
//! ## Example (Axum)
//!
//! ```rust,ignore
//! use stepstream::ui::{axum::to_sse_response, UiStreamOptions};
//!
//! async fn chat(result: StreamTextResult) -> impl axum::response::IntoResponse {
//!     to_sse_response(result.to_ui_message_stream(UiStreamOptions::default()))
//! }
//! ```

#[cfg(feature = "server-adapters")]
pub mod axum;

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;
use crate::streaming::{BoxedStream, StreamPart};
use crate::types::{FinishReason, Source};

/// SSE payload closing every UI message stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Options for the UI projection.
#[derive(Debug, Clone)]
pub struct UiStreamOptions {
    /// Forward reasoning chunks. Default: `true`
    pub send_reasoning: bool,
    /// Forward source chunks. Default: `false`
    pub send_sources: bool,
    /// Emit the `start` chunk. Default: `true`
    pub send_start: bool,
    /// Emit the `finish` chunk. Default: `true`
    pub send_finish: bool,
    /// Replace error details with a generic message. Default: `true`
    pub mask_errors: bool,
    /// Message used when `mask_errors` is set; `"An error occurred."` if `None`.
    pub masked_error_message: Option<String>,
    /// Id of the assistant message, sent with `start`.
    pub message_id: Option<String>,
}

impl Default for UiStreamOptions {
    fn default() -> Self {
        Self {
            send_reasoning: true,
            send_sources: false,
            send_start: true,
            send_finish: true,
            mask_errors: true,
            masked_error_message: None,
            message_id: None,
        }
    }
}

impl UiStreamOptions {
    /// Expose error details; for development only.
    pub fn development() -> Self {
        Self {
            mask_errors: false,
            send_sources: true,
            ..Default::default()
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_send_reasoning(mut self, send: bool) -> Self {
        self.send_reasoning = send;
        self
    }

    pub fn with_send_sources(mut self, send: bool) -> Self {
        self.send_sources = send;
        self
    }

    pub fn with_mask_errors(mut self, mask: bool) -> Self {
        self.mask_errors = mask;
        self
    }

    fn error_text(&self, error: &LlmError) -> String {
        if self.mask_errors {
            self.masked_error_message
                .clone()
                .unwrap_or_else(|| "An error occurred.".to_string())
        } else {
            error.to_string()
        }
    }
}

/// One UI wire event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiMessageChunk {
    #[serde(rename_all = "camelCase")]
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    StartStep,
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    ReasoningStart { id: String },
    ReasoningDelta { id: String, delta: String },
    ReasoningEnd { id: String },
    #[serde(rename_all = "camelCase")]
    SourceUrl {
        source_id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SourceDocument {
        source_id: String,
        media_type: String,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    File { url: String, media_type: String },
    #[serde(rename_all = "camelCase")]
    ToolInputStart {
        tool_call_id: String,
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_executed: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dynamic: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputDelta {
        tool_call_id: String,
        input_text_delta: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_executed: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dynamic: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputError {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        error_text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable {
        tool_call_id: String,
        output: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_executed: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preliminary: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dynamic: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_executed: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dynamic: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputDenied { tool_call_id: String },
    #[serde(rename_all = "camelCase")]
    ToolApprovalRequest {
        approval_id: String,
        tool_call_id: String,
    },
    FinishStep,
    #[serde(rename_all = "camelCase")]
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
    },
    #[serde(rename_all = "camelCase")]
    Error { error_text: String },
    Abort,
}

fn flag(value: bool) -> Option<bool> {
    value.then_some(true)
}

/// Map one part to its wire event, or `None` when it is not sent.
pub fn to_ui_message_chunk(part: &StreamPart, options: &UiStreamOptions) -> Option<UiMessageChunk> {
    let chunk = match part {
        StreamPart::Start => {
            if !options.send_start {
                return None;
            }
            UiMessageChunk::Start {
                message_id: options.message_id.clone(),
            }
        }
        StreamPart::StartStep { .. } => UiMessageChunk::StartStep,
        StreamPart::TextStart { id, .. } => UiMessageChunk::TextStart { id: id.clone() },
        StreamPart::TextDelta { id, text } => UiMessageChunk::TextDelta {
            id: id.clone(),
            delta: text.clone(),
        },
        StreamPart::TextEnd { id } => UiMessageChunk::TextEnd { id: id.clone() },
        StreamPart::ReasoningStart { id, .. } if options.send_reasoning => {
            UiMessageChunk::ReasoningStart { id: id.clone() }
        }
        StreamPart::ReasoningDelta { id, text } if options.send_reasoning => {
            UiMessageChunk::ReasoningDelta {
                id: id.clone(),
                delta: text.clone(),
            }
        }
        StreamPart::ReasoningEnd { id } if options.send_reasoning => {
            UiMessageChunk::ReasoningEnd { id: id.clone() }
        }
        StreamPart::ReasoningStart { .. }
        | StreamPart::ReasoningDelta { .. }
        | StreamPart::ReasoningEnd { .. } => return None,
        StreamPart::Source(source) => {
            if !options.send_sources {
                return None;
            }
            match source {
                Source::Url { id, url, title } => UiMessageChunk::SourceUrl {
                    source_id: id.clone(),
                    url: url.clone(),
                    title: title.clone(),
                },
                Source::Document {
                    id,
                    media_type,
                    title,
                    filename,
                } => UiMessageChunk::SourceDocument {
                    source_id: id.clone(),
                    media_type: media_type.clone(),
                    title: title.clone(),
                    filename: filename.clone(),
                },
            }
        }
        StreamPart::File(file) => UiMessageChunk::File {
            url: file.data_url(),
            media_type: file.media_type.clone(),
        },
        StreamPart::ToolInputStart {
            id,
            tool_name,
            provider_executed,
            dynamic,
        } => UiMessageChunk::ToolInputStart {
            tool_call_id: id.clone(),
            tool_name: tool_name.clone(),
            provider_executed: flag(*provider_executed),
            dynamic: flag(*dynamic),
        },
        StreamPart::ToolInputDelta { id, delta } => UiMessageChunk::ToolInputDelta {
            tool_call_id: id.clone(),
            input_text_delta: delta.clone(),
        },
        StreamPart::ToolCall(call) => match &call.error {
            Some(error) if call.invalid => UiMessageChunk::ToolInputError {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                input: call.input.clone(),
                error_text: options.error_text(error),
            },
            _ => UiMessageChunk::ToolInputAvailable {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                input: call.input.clone(),
                provider_executed: flag(call.provider_executed),
                dynamic: flag(call.dynamic),
            },
        },
        StreamPart::ToolResult(result) => UiMessageChunk::ToolOutputAvailable {
            tool_call_id: result.tool_call_id.clone(),
            output: result.output.clone(),
            provider_executed: flag(result.provider_executed),
            preliminary: flag(result.preliminary),
            dynamic: flag(result.dynamic),
        },
        StreamPart::ToolError(error) => UiMessageChunk::ToolOutputError {
            tool_call_id: error.tool_call_id.clone(),
            error_text: options.error_text(&error.error),
            provider_executed: flag(error.provider_executed),
            dynamic: flag(error.dynamic),
        },
        StreamPart::ToolOutputDenied { tool_call_id, .. } => UiMessageChunk::ToolOutputDenied {
            tool_call_id: tool_call_id.clone(),
        },
        StreamPart::ToolApprovalRequest(request) => UiMessageChunk::ToolApprovalRequest {
            approval_id: request.approval_id.clone(),
            tool_call_id: request.tool_call.tool_call_id.clone(),
        },
        StreamPart::FinishStep { .. } => UiMessageChunk::FinishStep,
        StreamPart::Finish { finish_reason, .. } => {
            if !options.send_finish {
                return None;
            }
            UiMessageChunk::Finish {
                finish_reason: Some(finish_reason.clone()),
            }
        }
        StreamPart::Error { error } => UiMessageChunk::Error {
            error_text: options.error_text(error),
        },
        StreamPart::Abort => UiMessageChunk::Abort,
        StreamPart::ToolInputEnd { .. } | StreamPart::Raw { .. } => return None,
    };
    Some(chunk)
}

/// Project a part stream into UI chunks.
pub fn ui_message_stream<S>(parts: S, options: UiStreamOptions) -> BoxedStream<UiMessageChunk>
where
    S: Stream<Item = StreamPart> + Send + 'static,
{
    Box::pin(parts.filter_map(move |part| {
        let chunk = to_ui_message_chunk(&part, &options);
        async move { chunk }
    }))
}

/// Serialize one chunk as an SSE frame.
pub fn encode_sse_frame(chunk: &UiMessageChunk) -> String {
    let data = serde_json::to_string(chunk).unwrap_or_else(|_| "{}".to_string());
    format!("data: {data}\n\n")
}

/// SSE frames for `chunks`, closed by the `[DONE]` sentinel.
pub fn sse_stream<S>(chunks: S) -> BoxedStream<Bytes>
where
    S: Stream<Item = UiMessageChunk> + Send + 'static,
{
    let frames = chunks.map(|chunk| Bytes::from(encode_sse_frame(&chunk)));
    let done = stream::once(async { Bytes::from(format!("data: {DONE_SENTINEL}\n\n")) });
    Box::pin(frames.chain(done))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;
    use serde_json::json;

    #[test]
    fn chunks_serialize_with_wire_names() {
        let chunk = to_ui_message_chunk(
            &StreamPart::ToolCall(ToolCall::new("c1", "getItemId", json!({}))),
            &UiStreamOptions::default(),
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({
                "type": "tool-input-available",
                "toolCallId": "c1",
                "toolName": "getItemId",
                "input": {}
            })
        );
    }

    #[test]
    fn errors_are_masked_by_default() {
        let part = StreamPart::Error {
            error: LlmError::api(500, "secret upstream detail"),
        };
        assert_eq!(
            to_ui_message_chunk(&part, &UiStreamOptions::default()),
            Some(UiMessageChunk::Error {
                error_text: "An error occurred.".into()
            })
        );
        match to_ui_message_chunk(&part, &UiStreamOptions::development()) {
            Some(UiMessageChunk::Error { error_text }) => assert!(error_text.contains("secret")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn raw_reasoning_and_sources_follow_options() {
        let options = UiStreamOptions::default().with_send_reasoning(false);
        assert_eq!(
            to_ui_message_chunk(&StreamPart::Raw { raw_value: json!(1) }, &options),
            None
        );
        let reasoning = StreamPart::ReasoningDelta {
            id: "r".into(),
            text: "hmm".into(),
        };
        assert_eq!(to_ui_message_chunk(&reasoning, &options), None);
        let source = StreamPart::Source(Source::Url {
            id: "s1".into(),
            url: "https://example.com".into(),
            title: None,
        });
        assert_eq!(to_ui_message_chunk(&source, &options), None);
        assert!(to_ui_message_chunk(&source, &options.with_send_sources(true)).is_some());
    }

    #[tokio::test]
    async fn sse_stream_ends_with_done() {
        let frames: Vec<Bytes> = sse_stream(stream::iter(vec![UiMessageChunk::StartStep]))
            .collect()
            .await;
        assert_eq!(frames[0], Bytes::from("data: {\"type\":\"start-step\"}\n\n"));
        assert_eq!(frames[1], Bytes::from("data: [DONE]\n\n"));
    }
}
