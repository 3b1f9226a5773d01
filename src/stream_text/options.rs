//! Run configuration.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;

use crate::error::LlmError;
use crate::model::{CallSettings, LanguageModel, ModelToolCall, ToolChoice};
use crate::output::Output;
use crate::prepare_step::{PrepareStepContext, PrepareStepFn, PrepareStepResult};
use crate::retry::RetryPolicy;
use crate::step::StepResult;
use crate::stop_condition::{StopCondition, step_count_is};
use crate::streaming::StreamPart;
use crate::telemetry::TelemetrySettings;
use crate::tool::{RepairRequest, RepairToolCallFn, Tool, ToolSet};
use crate::types::{FinishReason, ModelMessage, Usage};
use crate::utils::{CancelHandle, IdGenerator, create_id_generator};

/// Called with every content-bearing part.
pub type OnChunkFn = Arc<dyn Fn(&StreamPart) + Send + Sync>;
/// Called once per step, before the next step starts.
pub type OnStepFinishFn = Arc<dyn Fn(&StepResult) + Send + Sync>;
/// Called when the run finishes successfully.
pub type OnFinishFn = Arc<dyn Fn(&FinishEvent) + Send + Sync>;
/// Called with the steps completed before the run was aborted.
pub type OnAbortFn = Arc<dyn Fn(&[StepResult]) + Send + Sync>;
/// Called for every error part.
pub type OnErrorFn = Arc<dyn Fn(&LlmError) + Send + Sync>;

/// Summary handed to `on_finish`.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishEvent {
    pub steps: Vec<StepResult>,
    pub total_usage: Usage,
    pub finish_reason: FinishReason,
}

impl FinishEvent {
    /// Text of the final step.
    pub fn text(&self) -> String {
        self.steps.last().map(StepResult::text).unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub(crate) struct RunCallbacks {
    pub on_chunk: Option<OnChunkFn>,
    pub on_step_finish: Option<OnStepFinishFn>,
    pub on_finish: Option<OnFinishFn>,
    pub on_abort: Option<OnAbortFn>,
    pub on_error: Option<OnErrorFn>,
}

/// Options of [`stream_text`](super::stream_text).
///
/// Exactly one of `prompt` and `messages` must be set. `stop_when` defaults
/// to `step_count_is(1)`, so tool results are only sent back to the model
/// when a broader condition is configured.
pub struct StreamTextOptions {
    pub model: Arc<dyn LanguageModel>,
    pub system: Option<String>,
    pub prompt: Option<String>,
    pub messages: Option<Vec<ModelMessage>>,
    pub tools: ToolSet,
    pub tool_choice: Option<ToolChoice>,
    pub active_tools: Option<Vec<String>>,
    pub stop_when: Vec<Box<dyn StopCondition>>,
    pub prepare_step: Option<PrepareStepFn>,
    pub repair_tool_call: Option<RepairToolCallFn>,
    pub settings: CallSettings,
    pub output: Output,
    /// Forward vendor chunks as `raw` parts.
    pub include_raw_chunks: bool,
    /// Opaque value handed to tools and hooks.
    pub context: Option<Value>,
    pub retry: RetryPolicy,
    pub telemetry: TelemetrySettings,
    pub generate_id: IdGenerator,
    pub cancel: CancelHandle,
    pub(crate) callbacks: RunCallbacks,
}

impl StreamTextOptions {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            system: None,
            prompt: None,
            messages: None,
            tools: ToolSet::new(),
            tool_choice: None,
            active_tools: None,
            stop_when: vec![step_count_is(1)],
            prepare_step: None,
            repair_tool_call: None,
            settings: CallSettings::default(),
            output: Output::Text,
            include_raw_chunks: false,
            context: None,
            retry: RetryPolicy::default(),
            telemetry: TelemetrySettings::default(),
            generate_id: create_id_generator("aitxt"),
            cancel: CancelHandle::new(),
            callbacks: RunCallbacks::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<ModelMessage>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>, tool: Tool) -> Self {
        self.tools.insert(name, tool);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_active_tools(mut self, active_tools: Vec<String>) -> Self {
        self.active_tools = Some(active_tools);
        self
    }

    /// Replace the stop conditions with a single one.
    pub fn with_stop_when(mut self, condition: Box<dyn StopCondition>) -> Self {
        self.stop_when = vec![condition];
        self
    }

    /// Replace the stop conditions; the run stops when any of them is met.
    pub fn with_stop_conditions(mut self, conditions: Vec<Box<dyn StopCondition>>) -> Self {
        self.stop_when = conditions;
        self
    }

    pub fn with_prepare_step<F>(mut self, prepare_step: F) -> Self
    where
        F: Fn(PrepareStepContext<'_>) -> PrepareStepResult + Send + Sync + 'static,
    {
        self.prepare_step = Some(Arc::new(prepare_step));
        self
    }

    pub fn with_repair_tool_call<F, Fut>(mut self, repair: F) -> Self
    where
        F: Fn(RepairRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<ModelToolCall>, LlmError>> + Send + 'static,
    {
        self.repair_tool_call = Some(Arc::new(move |request| repair(request).boxed()));
        self
    }

    pub fn with_settings(mut self, settings: CallSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn with_include_raw_chunks(mut self, include: bool) -> Self {
        self.include_raw_chunks = include;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySettings) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_id_generator(mut self, generate_id: IdGenerator) -> Self {
        self.generate_id = generate_id;
        self
    }

    /// Use an externally owned cancel handle.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_chunk<F>(mut self, f: F) -> Self
    where
        F: Fn(&StreamPart) + Send + Sync + 'static,
    {
        self.callbacks.on_chunk = Some(Arc::new(f));
        self
    }

    pub fn on_step_finish<F>(mut self, f: F) -> Self
    where
        F: Fn(&StepResult) + Send + Sync + 'static,
    {
        self.callbacks.on_step_finish = Some(Arc::new(f));
        self
    }

    pub fn on_finish<F>(mut self, f: F) -> Self
    where
        F: Fn(&FinishEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_finish = Some(Arc::new(f));
        self
    }

    pub fn on_abort<F>(mut self, f: F) -> Self
    where
        F: Fn(&[StepResult]) + Send + Sync + 'static,
    {
        self.callbacks.on_abort = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&LlmError) + Send + Sync + 'static,
    {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }
}
