//! The step loop.
//!
//! Every step is one sub-stream of the run's stitchable output. A step calls
//! the model, lifts its events into parts, runs tools concurrently, emits
//! `finish-step` once the model stream and every tool stream are done, waits
//! for the recorder to commit the step, and then either appends the next
//! step or emits `finish` and closes the output.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::SelectAll;
use serde_json::Value;
use tracing::{Span, debug, warn};

use super::recorder::Recorder;
use crate::error::LlmError;
use crate::model::{
    CallSettings, LanguageModel, LanguageModelRequest, ModelStreamEvent, ToolChoice,
};
use crate::output::Output;
use crate::prepare_step::{PrepareStepContext, PrepareStepFn, PrepareStepResult};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::stop_condition::{StopCondition, is_stop_condition_met};
use crate::streaming::{PartStream, StitchableHandle, StreamPart};
use crate::telemetry::TelemetrySettings;
use crate::tool::approval::approval_outputs_message;
use crate::tool::{
    ApprovedToolCalls, RepairToolCallFn, ToolCallOptions, ToolDispatch, ToolOutput, ToolSet,
    dispatch_tool_call, parse_tool_call, tool_output_stream,
};
use crate::types::{
    FinishReason, ModelMessage, Prompt, ProviderMetadata, ResponseMetadata, ToolError,
    ToolResult, Usage, Warning,
};
use crate::utils::{CancelHandle, IdGenerator};

/// Everything a step needs, shared by all steps of a run.
pub(crate) struct RunContext {
    pub model: Arc<dyn LanguageModel>,
    pub prompt: Prompt,
    pub tools: ToolSet,
    pub tool_choice: Option<ToolChoice>,
    pub active_tools: Option<Vec<String>>,
    pub stop_when: Vec<Box<dyn StopCondition>>,
    pub prepare_step: Option<PrepareStepFn>,
    pub repair_tool_call: Option<RepairToolCallFn>,
    pub settings: CallSettings,
    pub output: Output,
    pub include_raw_chunks: bool,
    pub context: Option<Value>,
    pub retry: RetryPolicy,
    pub telemetry: TelemetrySettings,
    pub generate_id: IdGenerator,
    pub cancel: CancelHandle,
    pub recorder: Arc<Recorder>,
    pub stitch: StitchableHandle<StreamPart>,
    pub span: Span,
}

impl RunContext {
    fn end_with(&self, part: &StreamPart) {
        debug!(parent: &self.span, terminal = part.type_name(), "run ended");
        self.stitch.close();
    }
}

/// First sub-stream of a run: `start`, then pending approvals, then step 0.
pub(crate) fn start_stream(ctx: Arc<RunContext>, approvals: ApprovedToolCalls) -> PartStream {
    Box::pin(async_stream::stream! {
        yield StreamPart::Start;

        if !approvals.is_empty() {
            debug!(
                parent: &ctx.span,
                approved = approvals.approved.len(),
                denied = approvals.denied.len(),
                "resolving tool approvals"
            );
            let mut outputs: Vec<ToolOutput> = Vec::new();
            let mut executions: SelectAll<PartStream> = SelectAll::new();
            for approval in &approvals.approved {
                let call = approval.tool_call.clone();
                let Some(tool) = ctx.tools.get(&call.tool_name).filter(|tool| tool.is_executable()) else {
                    continue;
                };
                let options = ToolCallOptions {
                    tool_call_id: call.tool_call_id.clone(),
                    messages: ctx.prompt.to_model_messages(),
                    cancel: ctx.cancel.clone(),
                    context: ctx.context.clone(),
                };
                executions.push(tool_output_stream(call, tool.clone(), options));
            }

            loop {
                if executions.is_empty() {
                    break;
                }
                let next = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => None,
                    part = executions.next() => Some(part),
                };
                match next {
                    None => {
                        yield StreamPart::Abort;
                        ctx.end_with(&StreamPart::Abort);
                        return;
                    }
                    Some(None) => break,
                    Some(Some(part)) => {
                        match &part {
                            StreamPart::ToolResult(result) if !result.preliminary => {
                                outputs.push(ToolOutput::Result(result.clone()))
                            }
                            StreamPart::ToolError(error) => outputs.push(ToolOutput::Error(error.clone())),
                            _ => {}
                        }
                        yield part;
                    }
                }
            }

            for denied in &approvals.denied {
                yield StreamPart::ToolOutputDenied {
                    tool_call_id: denied.tool_call.tool_call_id.clone(),
                    tool_name: denied.tool_call.tool_name.clone(),
                };
            }
            if let Some(message) = approval_outputs_message(&outputs, &approvals.denied, &ctx.tools) {
                ctx.recorder.seed_response_message(message);
            }
        }

        if let Err(error) = ctx.stitch.add_stream(step_stream(ctx.clone(), 0)) {
            debug!(parent: &ctx.span, error = %error, "run closed before the first step");
        }
    })
}

/// Inputs of one model call after `prepare_step` overrides.
struct StepInput {
    model: Arc<dyn LanguageModel>,
    system: Option<String>,
    messages: Vec<ModelMessage>,
    tools: ToolSet,
    request: LanguageModelRequest,
}

fn prepare_step_input(ctx: &RunContext, step_number: usize) -> StepInput {
    let steps = ctx.recorder.steps();
    let mut messages = ctx.prompt.messages.clone();
    messages.extend(ctx.recorder.response_messages());

    let prepared = match &ctx.prepare_step {
        Some(prepare_step) => prepare_step(PrepareStepContext {
            step_number,
            steps: &steps,
            messages: &messages,
            model: &ctx.model,
            context: ctx.context.as_ref(),
        }),
        None => PrepareStepResult::default(),
    };

    let model = prepared.model.unwrap_or_else(|| ctx.model.clone());
    let system = prepared.system.or_else(|| ctx.prompt.system.clone());
    let messages = prepared.messages.unwrap_or(messages);
    let active_tools = prepared.active_tools.or_else(|| ctx.active_tools.clone());
    let tools = ctx.tools.filter_active(active_tools.as_deref());
    let tool_choice = prepared.tool_choice.or_else(|| ctx.tool_choice.clone());

    let mut settings = ctx.settings.clone();
    if let Some(provider_options) = prepared.provider_options {
        settings.provider_options = Some(provider_options);
    }

    let prompt = Prompt {
        system: system.clone(),
        messages: messages.clone(),
    };
    let request = LanguageModelRequest {
        prompt: prompt.to_model_messages(),
        tools: tools.definitions(),
        tool_choice: if tools.is_empty() { None } else { tool_choice },
        settings,
        response_format: match ctx.output {
            Output::Text => None,
            ref output => Some(output.response_format()),
        },
        include_raw_chunks: ctx.include_raw_chunks,
    };

    StepInput {
        model,
        system,
        messages,
        tools,
        request,
    }
}

enum Next {
    Cancelled,
    Tool(StreamPart),
    ToolsDrained,
    Model(Option<Result<ModelStreamEvent, LlmError>>),
}

/// Per-step bookkeeping of the model side.
#[derive(Default)]
struct StepState {
    started: bool,
    warnings: Vec<Warning>,
    response: ResponseMetadata,
    finish: Option<(FinishReason, Usage, Option<ProviderMetadata>)>,
    /// Input of every call seen so far, by id, for provider-executed results.
    call_inputs: HashMap<String, Value>,
    /// Tool name of every streaming tool input, by id.
    input_tools: HashMap<String, String>,
}

pub(crate) fn step_stream(ctx: Arc<RunContext>, step_number: usize) -> PartStream {
    Box::pin(async_stream::stream! {
        if ctx.cancel.is_cancelled() {
            yield StreamPart::Abort;
            ctx.end_with(&StreamPart::Abort);
            return;
        }

        let barrier = ctx.recorder.step_barrier();
        let input = prepare_step_input(&ctx, step_number);
        let span = ctx.telemetry.step_span(&ctx.span, step_number, input.model.model_id());
        debug!(parent: &span, step = step_number, tools = input.tools.len(), "starting step");

        let handshake = {
            let model = input.model.clone();
            let request = input.request.clone();
            let cancel = ctx.cancel.clone();
            RetryExecutor::new(ctx.retry.clone())
                .execute(&ctx.cancel, move || {
                    let model = model.clone();
                    let request = request.clone();
                    let cancel = cancel.clone();
                    async move { model.do_stream(request, cancel).await }
                })
                .await
        };
        let response = match handshake {
            Ok(response) => response,
            Err(LlmError::Aborted) => {
                yield StreamPart::Abort;
                ctx.end_with(&StreamPart::Abort);
                return;
            }
            Err(error) => {
                warn!(parent: &span, error = %error, "model call failed");
                let part = StreamPart::Error { error };
                yield part.clone();
                ctx.end_with(&part);
                return;
            }
        };

        let request_metadata = response.request.clone();
        let mut model_events = response.stream;
        let mut state = StepState {
            response: ResponseMetadata {
                model_id: Some(input.model.model_id().to_string()),
                headers: response.response_headers.clone(),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut tool_streams: SelectAll<PartStream> = SelectAll::new();
        let mut model_done = false;

        loop {
            if model_done && tool_streams.is_empty() {
                break;
            }
            let next = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => Next::Cancelled,
                part = tool_streams.next(), if !tool_streams.is_empty() => match part {
                    Some(part) => Next::Tool(part),
                    None => Next::ToolsDrained,
                },
                event = model_events.next(), if !model_done => Next::Model(event),
            };

            let event = match next {
                Next::Cancelled => {
                    yield StreamPart::Abort;
                    ctx.end_with(&StreamPart::Abort);
                    return;
                }
                Next::ToolsDrained => continue,
                Next::Tool(part) => {
                    yield part;
                    continue;
                }
                Next::Model(None) => {
                    model_done = true;
                    continue;
                }
                Next::Model(Some(Err(error))) | Next::Model(Some(Ok(ModelStreamEvent::Error { error }))) => {
                    warn!(parent: &span, error = %error, "model stream failed");
                    let part = StreamPart::Error { error };
                    yield part.clone();
                    ctx.end_with(&part);
                    return;
                }
                Next::Model(Some(Ok(event))) => event,
            };

            match event {
                ModelStreamEvent::StreamStart { warnings } => {
                    state.warnings = warnings;
                    continue;
                }
                ModelStreamEvent::ResponseMetadata(metadata) => {
                    merge_response_metadata(&mut state.response, metadata);
                    continue;
                }
                ModelStreamEvent::Finish {
                    finish_reason,
                    usage,
                    provider_metadata,
                } => {
                    state.finish = Some((finish_reason, usage, provider_metadata));
                    continue;
                }
                ModelStreamEvent::Raw { .. } if !ctx.include_raw_chunks => continue,
                _ => {}
            }

            if !state.started {
                state.started = true;
                yield StreamPart::StartStep {
                    request: request_metadata.clone(),
                    warnings: state.warnings.clone(),
                };
            }

            match event {
                ModelStreamEvent::TextStart { id, provider_metadata } => {
                    yield StreamPart::TextStart { id, provider_metadata };
                }
                ModelStreamEvent::TextDelta { id, delta } => {
                    if !delta.is_empty() {
                        yield StreamPart::TextDelta { id, text: delta };
                    }
                }
                ModelStreamEvent::TextEnd { id } => {
                    yield StreamPart::TextEnd { id };
                }
                ModelStreamEvent::ReasoningStart { id, provider_metadata } => {
                    yield StreamPart::ReasoningStart { id, provider_metadata };
                }
                ModelStreamEvent::ReasoningDelta { id, delta } => {
                    yield StreamPart::ReasoningDelta { id, text: delta };
                }
                ModelStreamEvent::ReasoningEnd { id } => {
                    yield StreamPart::ReasoningEnd { id };
                }
                ModelStreamEvent::Source(source) => {
                    yield StreamPart::Source(source);
                }
                ModelStreamEvent::File(file) => {
                    yield StreamPart::File(file);
                }
                ModelStreamEvent::Raw { raw_value } => {
                    yield StreamPart::Raw { raw_value };
                }
                ModelStreamEvent::ToolInputStart { id, tool_name, provider_executed } => {
                    let tool = input.tools.get(&tool_name);
                    if let Some(tool) = tool {
                        tool.notify_input_start(&id);
                    }
                    let dynamic = tool.is_none();
                    state.input_tools.insert(id.clone(), tool_name.clone());
                    yield StreamPart::ToolInputStart { id, tool_name, provider_executed, dynamic };
                }
                ModelStreamEvent::ToolInputDelta { id, delta } => {
                    if let Some(tool) = state.input_tools.get(&id).and_then(|name| input.tools.get(name)) {
                        tool.notify_input_delta(&id, &delta);
                    }
                    yield StreamPart::ToolInputDelta { id, delta };
                }
                ModelStreamEvent::ToolInputEnd { id } => {
                    state.input_tools.remove(&id);
                    yield StreamPart::ToolInputEnd { id };
                }
                ModelStreamEvent::ToolCall(model_call) => {
                    let call = parse_tool_call(
                        model_call,
                        &input.tools,
                        ctx.repair_tool_call.as_ref(),
                        input.system.as_deref(),
                        &input.messages,
                        ctx.context.as_ref(),
                    )
                    .await;
                    state.call_inputs.insert(call.tool_call_id.clone(), call.input.clone());
                    if !call.invalid {
                        if let Some(tool) = input.tools.get(&call.tool_name) {
                            tool.notify_input_available(&call.tool_call_id, &call.input);
                        }
                    }
                    yield StreamPart::ToolCall(call.clone());

                    match dispatch_tool_call(&call, &input.tools, &ctx.generate_id) {
                        ToolDispatch::Invalid(error) => {
                            yield StreamPart::ToolError(error);
                        }
                        ToolDispatch::ProviderExecuted | ToolDispatch::ClientSide => {}
                        ToolDispatch::NeedsApproval(request) => {
                            yield StreamPart::ToolApprovalRequest(request);
                        }
                        ToolDispatch::Execute(tool) => {
                            let options = ToolCallOptions {
                                tool_call_id: call.tool_call_id.clone(),
                                messages: input.request.prompt.clone(),
                                cancel: ctx.cancel.clone(),
                                context: ctx.context.clone(),
                            };
                            tool_streams.push(tool_output_stream(call, tool, options));
                        }
                    }
                }
                ModelStreamEvent::ToolResult { tool_call_id, tool_name, result, is_error } => {
                    let input_value = state.call_inputs.get(&tool_call_id).cloned().unwrap_or(Value::Null);
                    let dynamic = !input.tools.contains(&tool_name);
                    if is_error {
                        yield StreamPart::ToolError(ToolError {
                            error: LlmError::ToolExecutionError {
                                tool_name: tool_name.clone(),
                                tool_call_id: tool_call_id.clone(),
                                message: result.to_string(),
                            },
                            tool_call_id,
                            tool_name,
                            input: input_value,
                            provider_executed: true,
                            dynamic,
                        });
                    } else {
                        yield StreamPart::ToolResult(ToolResult {
                            tool_call_id,
                            tool_name,
                            input: input_value,
                            output: result,
                            provider_executed: true,
                            dynamic,
                            preliminary: false,
                        });
                    }
                }
                ModelStreamEvent::StreamStart { .. }
                | ModelStreamEvent::ResponseMetadata(_)
                | ModelStreamEvent::Finish { .. }
                | ModelStreamEvent::Error { .. } => {}
            }
        }

        if !state.started {
            yield StreamPart::StartStep {
                request: request_metadata.clone(),
                warnings: state.warnings.clone(),
            };
        }
        let (finish_reason, usage, provider_metadata) = state.finish.take().unwrap_or_else(|| {
            warn!(parent: &span, step = step_number, "model stream ended without a finish event");
            (FinishReason::Unknown, Usage::default(), None)
        });
        ctx.telemetry.record_outcome(&span, &finish_reason, &usage);
        yield StreamPart::FinishStep {
            response: state.response,
            usage,
            finish_reason,
            provider_metadata,
        };

        let step = match barrier.wait().await {
            Ok(step) => step,
            Err(error) => {
                debug!(parent: &span, error = %error, "step barrier released without a step");
                return;
            }
        };

        let steps = ctx.recorder.steps();
        // Stop conditions only see steps whose client tool calls all have outputs.
        let proceed = step.client_tool_calls_settled()
            && !is_stop_condition_met(&ctx.stop_when, &steps);
        debug!(parent: &span, step = step_number, proceed, "step committed");

        if proceed && !ctx.cancel.is_cancelled() {
            match ctx.stitch.add_stream(step_stream(ctx.clone(), step_number + 1)) {
                Ok(()) => return,
                Err(error) => debug!(parent: &span, error = %error, "run closed before the next step"),
            }
        }
        if ctx.cancel.is_cancelled() {
            yield StreamPart::Abort;
            ctx.end_with(&StreamPart::Abort);
            return;
        }

        let total_usage = Usage::sum(steps.iter().map(|step| &step.usage));
        ctx.telemetry.record_outcome(&ctx.span, &step.finish_reason, &total_usage);
        let part = StreamPart::Finish {
            finish_reason: step.finish_reason.clone(),
            total_usage,
        };
        yield part.clone();
        ctx.end_with(&part);
    })
}

fn merge_response_metadata(target: &mut ResponseMetadata, update: ResponseMetadata) {
    if update.id.is_some() {
        target.id = update.id;
    }
    if update.model_id.is_some() {
        target.model_id = update.model_id;
    }
    if update.timestamp.is_some() {
        target.timestamp = update.timestamp;
    }
    target.headers.extend(update.headers);
}
