//! Per-step overrides.
//!
//! A prepare-step hook runs before every model call and may override the
//! model, tools, system message or history for that step only.

use std::sync::Arc;

use serde_json::Value;

use crate::model::{LanguageModel, ToolChoice};
use crate::step::StepResult;
use crate::types::{ModelMessage, ProviderMetadata};

/// Context provided to the prepare step callback.
pub struct PrepareStepContext<'a> {
    /// The current step number (0-indexed).
    pub step_number: usize,
    /// All steps executed so far.
    pub steps: &'a [StepResult],
    /// The message history that will be sent to the model.
    pub messages: &'a [ModelMessage],
    /// The run's model.
    pub model: &'a Arc<dyn LanguageModel>,
    pub context: Option<&'a Value>,
}

/// Overrides for one step. `None` keeps the run-level value.
#[derive(Default)]
pub struct PrepareStepResult {
    pub model: Option<Arc<dyn LanguageModel>>,
    pub tool_choice: Option<ToolChoice>,
    /// Limit which tools are available for this step.
    pub active_tools: Option<Vec<String>>,
    pub system: Option<String>,
    pub messages: Option<Vec<ModelMessage>>,
    /// Provider options for this step, replacing the run-level ones.
    pub provider_options: Option<ProviderMetadata>,
}

impl PrepareStepResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_active_tools(mut self, tools: Vec<String>) -> Self {
        self.active_tools = Some(tools);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<ModelMessage>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_provider_options(mut self, options: ProviderMetadata) -> Self {
        self.provider_options = Some(options);
        self
    }
}

/// Callback invoked before each step.
///
/// ```rust,ignore
/// let prepare_step: PrepareStepFn = Arc::new(|ctx| {
///     if ctx.step_number == 0 {
///         PrepareStepResult::new()
///             .with_tool_choice(ToolChoice::Tool { tool_name: "search".into() })
///             .with_active_tools(vec!["search".into()])
///     } else {
///         PrepareStepResult::default()
///     }
/// });
/// ```
pub type PrepareStepFn = Arc<dyn Fn(PrepareStepContext<'_>) -> PrepareStepResult + Send + Sync>;
