//! The streaming step loop.
//!
//! [`stream_text`] wires one run together:
//!
//! ```text
//! step streams ──► stitchable ──► recorder ──► output transform ──► tee ──► projections
//!      ▲                              │
//!      └──────── step barrier ────────┘
//! ```
//!
//! Each step is a sub-stream appended to the stitchable stream. Every part
//! passes the recorder exactly once before any projection sees it, and the
//! recorder releases a step's barrier only after the step is committed, so
//! the next step always starts from up-to-date state.

pub mod options;
mod orchestrator;
mod output_transform;
mod recorder;
mod result;

use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;

pub use options::{
    FinishEvent, OnAbortFn, OnChunkFn, OnErrorFn, OnFinishFn, OnStepFinishFn, StreamTextOptions,
};
pub use result::{GenerateTextResult, StreamTextResult};

use self::orchestrator::{RunContext, start_stream};
use self::output_transform::{EnrichedPart, OutputTransform};
use self::recorder::Recorder;
use crate::error::LlmError;
use crate::streaming::{BoxedStream, StitchableStream, StreamPart, stitchable_stream, tee};
use crate::tool::collect_tool_approvals;
use crate::types::Prompt;

/// Settles the recorder however the pipeline ends, including when every
/// reader is dropped mid-run.
struct FlushOnDrop(Arc<Recorder>);

impl Drop for FlushOnDrop {
    fn drop(&mut self) {
        self.0.flush();
    }
}

fn pipeline(
    mut stitched: StitchableStream<StreamPart>,
    recorder: Arc<Recorder>,
    mut transform: OutputTransform,
) -> BoxedStream<EnrichedPart> {
    Box::pin(async_stream::stream! {
        let _flush = FlushOnDrop(recorder.clone());
        while let Some(part) = stitched.next().await {
            let part = recorder.process(part);
            let partial_output = transform.process(&part);
            yield EnrichedPart { part, partial_output };
        }
    })
}

/// Start a run.
///
/// Fails only on invalid input: a malformed prompt or inconsistent approval
/// responses. Everything else surfaces as parts of the returned streams.
/// The run is lazy; it makes progress while a projection is read or an
/// accessor is awaited.
pub fn stream_text(options: StreamTextOptions) -> Result<StreamTextResult, LlmError> {
    let StreamTextOptions {
        model,
        system,
        prompt,
        messages,
        tools,
        tool_choice,
        active_tools,
        stop_when,
        prepare_step,
        repair_tool_call,
        settings,
        output,
        include_raw_chunks,
        context,
        retry,
        telemetry,
        generate_id,
        cancel,
        callbacks,
    } = options;

    let prompt = Prompt::standardize(system, prompt, messages)?;
    let approvals = collect_tool_approvals(&prompt.messages)?;
    let span = telemetry.run_span(model.provider(), model.model_id(), prompt.messages.len());
    debug!(
        parent: &span,
        provider = model.provider(),
        model = model.model_id(),
        tools = tools.len(),
        "starting run"
    );

    let recorder = Arc::new(Recorder::new(tools.clone(), callbacks));
    let handles = recorder.handles().clone();
    let (stitch, stitched) = stitchable_stream::<StreamPart>();

    let ctx = Arc::new(RunContext {
        model,
        prompt,
        tools,
        tool_choice,
        active_tools,
        stop_when,
        prepare_step,
        repair_tool_call,
        settings,
        output: output.clone(),
        include_raw_chunks,
        context,
        retry,
        telemetry,
        generate_id,
        cancel: cancel.clone(),
        recorder: recorder.clone(),
        stitch: stitch.clone(),
        span,
    });

    let origin = tee(pipeline(stitched, recorder, OutputTransform::new(output.clone())));
    stitch.add_stream(start_stream(ctx, approvals))?;

    Ok(StreamTextResult::new(origin, handles, output, cancel))
}

/// Run to completion and collect the result.
///
/// Fails with the error of an `error` part, or [`LlmError::Aborted`] when
/// the run was cancelled.
pub async fn generate_text(options: StreamTextOptions) -> Result<GenerateTextResult, LlmError> {
    let result = stream_text(options)?;
    let mut parts = result.full_stream();
    while let Some(part) = parts.next().await {
        match part {
            StreamPart::Error { error } => return Err(error),
            StreamPart::Abort => return Err(LlmError::Aborted),
            _ => {}
        }
    }

    let output = if result.has_structured_output() {
        Some(result.output().await?)
    } else {
        None
    };
    Ok(GenerateTextResult {
        steps: result.steps().await?,
        total_usage: result.total_usage().await?,
        finish_reason: result.finish_reason().await?,
        output,
    })
}
