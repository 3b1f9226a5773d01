//! The handle returned by [`stream_text`](super::stream_text).

use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;

use super::output_transform::EnrichedPart;
use super::recorder::RunHandles;
use crate::error::{LlmError, OutputErrorContext};
use crate::output::Output;
use crate::step::{StepResponse, StepResult};
use crate::streaming::{BoxedStream, StreamPart, Tee};
use crate::types::{
    ContentPart, FinishReason, ModelMessage, Source, ToolCall, ToolResult, Usage, Warning,
};
use crate::ui::{UiMessageChunk, UiStreamOptions, sse_stream, ui_message_stream};
use crate::utils::CancelHandle;

/// One run of the step loop.
///
/// Every projection is an independent reader of the same part sequence and
/// sees it from the first part, no matter when it is requested. Nothing runs
/// until a projection is polled or an accessor is awaited; accessors drain
/// the run themselves.
///
/// The result keeps a reader parked at the first part, so every part of the
/// run stays buffered for as long as the result is alive. Long-running
/// callers that only need a projection should drop the result once they hold
/// it.
pub struct StreamTextResult {
    origin: Tee<EnrichedPart>,
    handles: RunHandles,
    output: Output,
    cancel: CancelHandle,
}

impl StreamTextResult {
    pub(crate) fn new(
        origin: Tee<EnrichedPart>,
        handles: RunHandles,
        output: Output,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            origin,
            handles,
            output,
            cancel,
        }
    }

    /// Every part of the run.
    pub fn full_stream(&self) -> BoxedStream<StreamPart> {
        Box::pin(self.origin.fork().map(|enriched| enriched.part))
    }

    /// Text deltas only.
    pub fn text_stream(&self) -> BoxedStream<String> {
        Box::pin(self.origin.fork().filter_map(|enriched| async move {
            match enriched.part {
                StreamPart::TextDelta { text, .. } if !text.is_empty() => Some(text),
                _ => None,
            }
        }))
    }

    /// Successive partial parses of the structured output. Consecutive
    /// values always differ.
    pub fn partial_output_stream(&self) -> BoxedStream<Value> {
        Box::pin(
            self.origin
                .fork()
                .filter_map(|enriched| async move { enriched.partial_output }),
        )
    }

    /// The run as UI message chunks.
    pub fn to_ui_message_stream(&self, options: UiStreamOptions) -> BoxedStream<UiMessageChunk> {
        ui_message_stream(self.full_stream(), options)
    }

    /// The run as SSE frames, ending with `data: [DONE]`.
    pub fn to_sse_stream(&self, options: UiStreamOptions) -> BoxedStream<Bytes> {
        sse_stream(self.to_ui_message_stream(options))
    }

    /// Drive the run to its end without observing it.
    pub async fn consume_stream(&self) {
        let mut parts = self.origin.fork();
        while parts.next().await.is_some() {}
    }

    /// Cancel the run; it ends with an `abort` part.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn has_structured_output(&self) -> bool {
        !matches!(self.output, Output::Text)
    }

    /// The run's cancel handle.
    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// All committed steps.
    pub async fn steps(&self) -> Result<Vec<StepResult>, LlmError> {
        self.consume_stream().await;
        self.handles.steps.wait().await
    }

    /// Usage summed over all steps.
    pub async fn total_usage(&self) -> Result<Usage, LlmError> {
        self.consume_stream().await;
        self.handles.total_usage.wait().await
    }

    /// Finish reason of the last step.
    pub async fn finish_reason(&self) -> Result<FinishReason, LlmError> {
        self.consume_stream().await;
        self.handles.finish_reason.wait().await
    }

    async fn last_step(&self) -> Result<StepResult, LlmError> {
        self.steps()
            .await?
            .pop()
            .ok_or(LlmError::NoOutputGenerated)
    }

    /// Usage of the last step.
    pub async fn usage(&self) -> Result<Usage, LlmError> {
        Ok(self.last_step().await?.usage)
    }

    /// Text of the last step.
    pub async fn text(&self) -> Result<String, LlmError> {
        Ok(self.last_step().await?.text())
    }

    pub async fn reasoning_text(&self) -> Result<Option<String>, LlmError> {
        Ok(self.last_step().await?.reasoning_text())
    }

    pub async fn content(&self) -> Result<Vec<ContentPart>, LlmError> {
        Ok(self.last_step().await?.content)
    }

    pub async fn sources(&self) -> Result<Vec<Source>, LlmError> {
        Ok(self
            .last_step()
            .await?
            .sources()
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn tool_calls(&self) -> Result<Vec<ToolCall>, LlmError> {
        Ok(self
            .last_step()
            .await?
            .tool_calls()
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn tool_results(&self) -> Result<Vec<ToolResult>, LlmError> {
        Ok(self
            .last_step()
            .await?
            .tool_results()
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn warnings(&self) -> Result<Vec<Warning>, LlmError> {
        Ok(self.last_step().await?.warnings)
    }

    pub async fn response(&self) -> Result<StepResponse, LlmError> {
        Ok(self.last_step().await?.response)
    }

    /// Messages produced by the whole run, ready to append to the history.
    pub async fn response_messages(&self) -> Result<Vec<ModelMessage>, LlmError> {
        Ok(self.last_step().await?.response.messages)
    }

    /// The complete structured output of the last step, parsed from its
    /// first text unit. Later text units are not part of the output.
    ///
    /// Fails with [`LlmError::OutputParseError`] or
    /// [`LlmError::OutputValidationError`], both carrying the raw text.
    pub async fn output(&self) -> Result<Value, LlmError> {
        let step = self.last_step().await?;
        let context = OutputErrorContext {
            response: step.response.metadata.clone(),
            usage: step.usage,
            finish_reason: step.finish_reason.clone(),
        };
        self.output.parse_complete(step.first_text(), &context)
    }
}

/// Outcome of [`generate_text`](super::generate_text).
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateTextResult {
    pub steps: Vec<StepResult>,
    pub total_usage: Usage,
    pub finish_reason: FinishReason,
    /// Parsed output when a structured output was requested.
    pub output: Option<Value>,
}

impl GenerateTextResult {
    fn last_step(&self) -> Option<&StepResult> {
        self.steps.last()
    }

    /// Text of the last step.
    pub fn text(&self) -> String {
        self.last_step().map(StepResult::text).unwrap_or_default()
    }

    /// Usage of the last step.
    pub fn usage(&self) -> Usage {
        self.last_step().map(|step| step.usage).unwrap_or_default()
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.last_step()
            .map(StepResult::tool_calls)
            .unwrap_or_default()
    }

    pub fn tool_results(&self) -> Vec<&ToolResult> {
        self.last_step()
            .map(StepResult::tool_results)
            .unwrap_or_default()
    }

    pub fn response_messages(&self) -> Vec<ModelMessage> {
        self.last_step()
            .map(|step| step.response.messages.clone())
            .unwrap_or_default()
    }
}
