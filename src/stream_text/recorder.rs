//! Folds the part stream into durable step results.
//!
//! The recorder sees every part exactly once, in order, before any consumer.
//! It owns the per-step content buffers, the committed steps, the response
//! message history and the run's deferred handles. A step's barrier is only
//! resolved after its [`StepResult`] is committed and `on_step_finish` has
//! returned, so the next step always observes it.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::warn;

use super::options::{FinishEvent, RunCallbacks};
use crate::error::LlmError;
use crate::messages::to_response_messages;
use crate::step::{StepResponse, StepResult};
use crate::streaming::StreamPart;
use crate::tool::ToolSet;
use crate::types::{ContentPart, FinishReason, ModelMessage, RequestMetadata, Usage, Warning};
use crate::utils::{Deferred, lock};

/// Handles settled once per run.
#[derive(Clone, Default)]
pub(crate) struct RunHandles {
    pub steps: Deferred<Vec<StepResult>>,
    pub total_usage: Deferred<Usage>,
    pub finish_reason: Deferred<FinishReason>,
}

#[derive(Default)]
struct RecorderState {
    steps: Vec<StepResult>,
    content: Vec<ContentPart>,
    active_text: HashMap<String, usize>,
    active_reasoning: HashMap<String, usize>,
    request: RequestMetadata,
    warnings: Vec<Warning>,
    response_messages: Vec<ModelMessage>,
    barriers: VecDeque<Deferred<StepResult>>,
}

/// Deferred work that must run without the state lock held.
enum Effect {
    Chunk(StreamPart),
    StepFinished {
        step: StepResult,
        barrier: Option<Deferred<StepResult>>,
    },
    Finished(FinishEvent),
    Failed(LlmError),
    Aborted(Vec<StepResult>),
}

pub(crate) struct Recorder {
    state: Mutex<RecorderState>,
    tools: ToolSet,
    callbacks: RunCallbacks,
    handles: RunHandles,
}

impl Recorder {
    pub fn new(tools: ToolSet, callbacks: RunCallbacks) -> Self {
        Self {
            state: Mutex::new(RecorderState::default()),
            tools,
            callbacks,
            handles: RunHandles::default(),
        }
    }

    pub fn handles(&self) -> &RunHandles {
        &self.handles
    }

    /// Register the completion barrier of the next step to finish.
    pub fn step_barrier(&self) -> Deferred<StepResult> {
        let barrier = Deferred::new();
        lock(&self.state).barriers.push_back(barrier.clone());
        barrier
    }

    pub fn steps(&self) -> Vec<StepResult> {
        lock(&self.state).steps.clone()
    }

    /// Response messages accumulated so far, seeded ones included.
    pub fn response_messages(&self) -> Vec<ModelMessage> {
        lock(&self.state).response_messages.clone()
    }

    /// Add a message produced before the first step.
    pub fn seed_response_message(&self, message: ModelMessage) {
        lock(&self.state).response_messages.push(message);
    }

    /// Record `part`. Returns the part to forward, which is an error part
    /// when `part` referenced an unknown text or reasoning id.
    pub fn process(&self, part: StreamPart) -> StreamPart {
        let mut effects = Vec::new();
        let part = {
            let mut state = lock(&self.state);
            match self.record(&mut state, &part, &mut effects) {
                Ok(()) => part,
                Err(error) => {
                    warn!(part = part.type_name(), error = %error, "dropping malformed stream part");
                    effects.clear();
                    effects.push(Effect::Failed(error.clone()));
                    StreamPart::Error { error }
                }
            }
        };
        if part.is_chunk() {
            effects.insert(0, Effect::Chunk(part.clone()));
        }
        self.run_effects(effects);
        part
    }

    fn record(
        &self,
        state: &mut RecorderState,
        part: &StreamPart,
        effects: &mut Vec<Effect>,
    ) -> Result<(), LlmError> {
        match part {
            StreamPart::StartStep { request, warnings } => {
                state.content.clear();
                state.active_text.clear();
                state.active_reasoning.clear();
                state.request = request.clone();
                state.warnings = warnings.clone();
            }
            StreamPart::TextStart {
                id,
                provider_metadata,
            } => {
                state.content.push(ContentPart::Text {
                    text: String::new(),
                    provider_metadata: provider_metadata.clone(),
                });
                let index = state.content.len() - 1;
                state.active_text.insert(id.clone(), index);
            }
            StreamPart::TextDelta { id, text } => {
                let index = active_index(&state.active_text, "text", id)?;
                if let Some(ContentPart::Text { text: buffer, .. }) = state.content.get_mut(index) {
                    buffer.push_str(text);
                }
            }
            StreamPart::TextEnd { id } => {
                if state.active_text.remove(id).is_none() {
                    return Err(unknown_id("text", id));
                }
            }
            StreamPart::ReasoningStart {
                id,
                provider_metadata,
            } => {
                state.content.push(ContentPart::Reasoning {
                    text: String::new(),
                    provider_metadata: provider_metadata.clone(),
                });
                let index = state.content.len() - 1;
                state.active_reasoning.insert(id.clone(), index);
            }
            StreamPart::ReasoningDelta { id, text } => {
                let index = active_index(&state.active_reasoning, "reasoning", id)?;
                if let Some(ContentPart::Reasoning { text: buffer, .. }) =
                    state.content.get_mut(index)
                {
                    buffer.push_str(text);
                }
            }
            StreamPart::ReasoningEnd { id } => {
                if state.active_reasoning.remove(id).is_none() {
                    return Err(unknown_id("reasoning", id));
                }
            }
            StreamPart::Source(source) => state.content.push(ContentPart::Source(source.clone())),
            StreamPart::File(file) => state.content.push(ContentPart::File(file.clone())),
            StreamPart::ToolCall(call) => state.content.push(ContentPart::ToolCall(call.clone())),
            StreamPart::ToolResult(result) if !result.preliminary => {
                state.content.push(ContentPart::ToolResult(result.clone()))
            }
            StreamPart::ToolError(error) => state.content.push(ContentPart::ToolError(error.clone())),
            StreamPart::ToolApprovalRequest(request) => {
                state
                    .content
                    .push(ContentPart::ToolApprovalRequest(request.clone()))
            }
            StreamPart::FinishStep {
                response,
                usage,
                finish_reason,
                provider_metadata,
            } => {
                let content = std::mem::take(&mut state.content);
                state.active_text.clear();
                state.active_reasoning.clear();
                let messages = to_response_messages(&content, &self.tools);
                state.response_messages.extend(messages);
                let step = StepResult {
                    step_number: state.steps.len(),
                    content,
                    finish_reason: finish_reason.clone(),
                    usage: usage.clone(),
                    warnings: std::mem::take(&mut state.warnings),
                    request: std::mem::take(&mut state.request),
                    response: StepResponse {
                        metadata: response.clone(),
                        messages: state.response_messages.clone(),
                    },
                    provider_metadata: provider_metadata.clone(),
                };
                state.steps.push(step.clone());
                effects.push(Effect::StepFinished {
                    step,
                    barrier: state.barriers.pop_front(),
                });
            }
            StreamPart::Finish {
                finish_reason,
                total_usage,
            } => {
                effects.push(Effect::Finished(FinishEvent {
                    steps: state.steps.clone(),
                    total_usage: total_usage.clone(),
                    finish_reason: finish_reason.clone(),
                }));
            }
            StreamPart::Error { error } => effects.push(Effect::Failed(error.clone())),
            StreamPart::Abort => effects.push(Effect::Aborted(state.steps.clone())),
            StreamPart::Start
            | StreamPart::ToolResult(_)
            | StreamPart::ToolInputStart { .. }
            | StreamPart::ToolInputDelta { .. }
            | StreamPart::ToolInputEnd { .. }
            | StreamPart::ToolOutputDenied { .. }
            | StreamPart::Raw { .. } => {}
        }
        Ok(())
    }

    fn run_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Chunk(part) => {
                    if let Some(on_chunk) = &self.callbacks.on_chunk {
                        on_chunk(&part);
                    }
                }
                Effect::StepFinished { step, barrier } => {
                    if let Some(on_step_finish) = &self.callbacks.on_step_finish {
                        on_step_finish(&step);
                    }
                    if let Some(barrier) = barrier {
                        barrier.resolve(step);
                    }
                }
                Effect::Finished(event) => {
                    self.handles.steps.resolve(event.steps.clone());
                    self.handles.total_usage.resolve(event.total_usage.clone());
                    self.handles.finish_reason.resolve(event.finish_reason.clone());
                    if let Some(on_finish) = &self.callbacks.on_finish {
                        on_finish(&event);
                    }
                }
                Effect::Failed(error) => {
                    if let Some(on_error) = &self.callbacks.on_error {
                        on_error(&error);
                    }
                }
                Effect::Aborted(steps) => {
                    if let Some(on_abort) = &self.callbacks.on_abort {
                        on_abort(&steps);
                    }
                }
            }
        }
    }

    /// Settle everything still pending once the part stream has ended.
    ///
    /// Without a single recorded step the handles fail with
    /// [`LlmError::NoOutputGenerated`].
    pub fn flush(&self) {
        let (steps, barriers) = {
            let mut state = lock(&self.state);
            (state.steps.clone(), std::mem::take(&mut state.barriers))
        };
        for barrier in barriers {
            barrier.reject(LlmError::Aborted);
        }

        match steps.last() {
            None => {
                self.handles.steps.reject(LlmError::NoOutputGenerated);
                self.handles.total_usage.reject(LlmError::NoOutputGenerated);
                self.handles.finish_reason.reject(LlmError::NoOutputGenerated);
            }
            Some(last) => {
                let finish_reason = last.finish_reason.clone();
                let total_usage = Usage::sum(steps.iter().map(|step| &step.usage));
                self.handles.steps.resolve(steps);
                self.handles.total_usage.resolve(total_usage);
                self.handles.finish_reason.resolve(finish_reason);
            }
        }
    }
}

fn active_index(active: &HashMap<String, usize>, kind: &str, id: &str) -> Result<usize, LlmError> {
    active.get(id).copied().ok_or_else(|| unknown_id(kind, id))
}

fn unknown_id(kind: &str, id: &str) -> LlmError {
    LlmError::StreamError(format!("{kind} part {id} not found"))
}
