//! Tools the model may call.
//!
//! A [`Tool`] is a closed capability: an input schema, an optional executor,
//! an optional model-output mapper, an approval policy and input lifecycle
//! hooks. Tools are selected by name from a [`ToolSet`].

pub mod approval;
pub mod executor;
pub mod output;
pub mod parse;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::error::LlmError;
use crate::model::ToolDefinition;
use crate::schema::SchemaValidator;
use crate::types::{ModelMessage, ToolResultOutput};
use crate::utils::CancelHandle;

pub use approval::{ApprovedToolCalls, CollectedApproval, collect_tool_approvals};
pub use executor::{ToolDispatch, ToolOutput, dispatch_tool_call, execute_tool_call, tool_output_stream};
pub use output::{create_tool_error_output, create_tool_model_output};
pub use parse::{RepairRequest, RepairToolCallFn, parse_tool_call};

/// Stream of outputs; every item but the last is preliminary.
pub type ToolOutputStream = Pin<Box<dyn Stream<Item = Result<Value, LlmError>> + Send>>;

/// What an executor hands back.
pub enum ToolExecution {
    /// A single final output.
    Output(Value),
    /// Preliminary outputs followed by the final one.
    Streaming(ToolOutputStream),
}

/// Context passed to `execute`.
#[derive(Debug, Clone)]
pub struct ToolCallOptions {
    pub tool_call_id: String,
    /// Messages sent to the model in the step that produced the call.
    pub messages: Vec<ModelMessage>,
    pub cancel: CancelHandle,
    /// Opaque caller context.
    pub context: Option<Value>,
}

/// Tool business logic.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        input: Value,
        options: ToolCallOptions,
    ) -> Result<ToolExecution, LlmError>;
}

struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> ToolExecutor for FnExecutor<F>
where
    F: Fn(Value, ToolCallOptions) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, LlmError>> + Send,
{
    async fn execute(
        &self,
        input: Value,
        options: ToolCallOptions,
    ) -> Result<ToolExecution, LlmError> {
        (self.0)(input, options).await.map(ToolExecution::Output)
    }
}

struct StreamFnExecutor<F>(F);

#[async_trait]
impl<F, S> ToolExecutor for StreamFnExecutor<F>
where
    F: Fn(Value, ToolCallOptions) -> S + Send + Sync,
    S: Stream<Item = Result<Value, LlmError>> + Send + 'static,
{
    async fn execute(
        &self,
        input: Value,
        options: ToolCallOptions,
    ) -> Result<ToolExecution, LlmError> {
        Ok(ToolExecution::Streaming(Box::pin((self.0)(input, options))))
    }
}

/// Maps a raw tool output to what the model sees.
pub type ToModelOutputFn = Arc<dyn Fn(&Value) -> ToolResultOutput + Send + Sync>;
/// Called with the tool call id when the model starts streaming input.
pub type InputStartFn = Arc<dyn Fn(&str) + Send + Sync>;
/// Called with the tool call id and an input text delta.
pub type InputDeltaFn = Arc<dyn Fn(&str, &str) + Send + Sync>;
/// Called with the tool call id and the parsed input.
pub type InputAvailableFn = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Whether a call must be approved by the user before it runs.
#[derive(Clone, Default)]
pub enum NeedsApproval {
    #[default]
    Never,
    Always,
    When(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

impl NeedsApproval {
    pub fn check(&self, input: &Value) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::When(predicate) => predicate(input),
        }
    }
}

/// A tool definition plus behavior.
#[derive(Clone)]
pub struct Tool {
    pub description: Option<String>,
    pub input_schema: Value,
    validator: SchemaValidator,
    executor: Option<Arc<dyn ToolExecutor>>,
    to_model_output: Option<ToModelOutputFn>,
    needs_approval: NeedsApproval,
    on_input_start: Option<InputStartFn>,
    on_input_delta: Option<InputDeltaFn>,
    on_input_available: Option<InputAvailableFn>,
}

impl Tool {
    /// A client-only tool: the model sees it, nothing runs locally.
    pub fn new(input_schema: Value) -> Self {
        Self {
            description: None,
            validator: SchemaValidator::new(&input_schema),
            input_schema,
            executor: None,
            to_model_output: None,
            needs_approval: NeedsApproval::Never,
            on_input_start: None,
            on_input_delta: None,
            on_input_available: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_executor(mut self, executor: impl ToolExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Execute with an async function returning one final output.
    pub fn with_execute<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Value, ToolCallOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, LlmError>> + Send + 'static,
    {
        self.with_executor(FnExecutor(f))
    }

    /// Execute with a function returning a stream of outputs. Each item is
    /// surfaced as a preliminary result; the last one is the final output.
    pub fn with_streaming_execute<F, S>(self, f: F) -> Self
    where
        F: Fn(Value, ToolCallOptions) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Value, LlmError>> + Send + 'static,
    {
        self.with_executor(StreamFnExecutor(f))
    }

    pub fn with_to_model_output<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> ToolResultOutput + Send + Sync + 'static,
    {
        self.to_model_output = Some(Arc::new(f));
        self
    }

    pub fn with_needs_approval(mut self, needs_approval: bool) -> Self {
        self.needs_approval = if needs_approval {
            NeedsApproval::Always
        } else {
            NeedsApproval::Never
        };
        self
    }

    pub fn with_needs_approval_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.needs_approval = NeedsApproval::When(Arc::new(f));
        self
    }

    pub fn on_input_start<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_input_start = Some(Arc::new(f));
        self
    }

    pub fn on_input_delta<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.on_input_delta = Some(Arc::new(f));
        self
    }

    pub fn on_input_available<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.on_input_available = Some(Arc::new(f));
        self
    }

    pub fn is_executable(&self) -> bool {
        self.executor.is_some()
    }

    pub(crate) fn executor(&self) -> Option<&Arc<dyn ToolExecutor>> {
        self.executor.as_ref()
    }

    pub(crate) fn to_model_output_fn(&self) -> Option<&ToModelOutputFn> {
        self.to_model_output.as_ref()
    }

    pub fn needs_approval(&self, input: &Value) -> bool {
        self.needs_approval.check(input)
    }

    /// Check `input` against the input schema.
    pub fn validate_input(&self, input: &Value) -> Result<(), String> {
        self.validator.validate(input)
    }

    pub(crate) fn notify_input_start(&self, tool_call_id: &str) {
        if let Some(hook) = &self.on_input_start {
            hook(tool_call_id);
        }
    }

    pub(crate) fn notify_input_delta(&self, tool_call_id: &str, delta: &str) {
        if let Some(hook) = &self.on_input_delta {
            hook(tool_call_id, delta);
        }
    }

    pub(crate) fn notify_input_available(&self, tool_call_id: &str, input: &Value) {
        if let Some(hook) = &self.on_input_available {
            hook(tool_call_id, input);
        }
    }

    pub fn definition(&self, name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

/// Tools keyed by unique name.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<String, Tool>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: impl Into<String>, tool: Tool) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, tool: Tool) {
        self.tools.insert(name.into(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Keep only the tools named in `active`; `None` keeps everything.
    pub fn filter_active(&self, active: Option<&[String]>) -> ToolSet {
        match active {
            None => self.clone(),
            Some(names) => ToolSet {
                tools: self
                    .tools
                    .iter()
                    .filter(|(name, _)| names.contains(name))
                    .map(|(name, tool)| (name.clone(), tool.clone()))
                    .collect(),
            },
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|(name, tool)| tool.definition(name))
            .collect()
    }
}

impl FromIterator<(String, Tool)> for ToolSet {
    fn from_iter<I: IntoIterator<Item = (String, Tool)>>(iter: I) -> Self {
        Self {
            tools: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather() -> Tool {
        Tool::new(json!({
            "type": "object",
            "properties": { "city": { "type": "string" } },
            "required": ["city"]
        }))
        .with_description("Get the weather")
        .with_execute(|input, _opts| async move { Ok(json!({"city": input["city"], "temp": 21})) })
    }

    #[test]
    fn filter_active_keeps_named_tools() {
        let tools = ToolSet::new()
            .with_tool("weather", weather())
            .with_tool("client", Tool::new(json!({})));

        assert_eq!(tools.filter_active(None).len(), 2);
        let active = tools.filter_active(Some(&["weather".to_string()]));
        assert_eq!(active.names(), vec!["weather".to_string()]);
        assert!(active.get("weather").unwrap().is_executable());
        assert!(!tools.get("client").unwrap().is_executable());
    }

    #[test]
    fn definitions_are_sorted_by_name() {
        let tools = ToolSet::new()
            .with_tool("b", Tool::new(json!({})))
            .with_tool("a", weather());
        let defs = tools.definitions();
        assert_eq!(defs[0].name, "a");
        assert_eq!(defs[0].description.as_deref(), Some("Get the weather"));
    }

    #[test]
    fn approval_policy() {
        let tool = Tool::new(json!({})).with_needs_approval_fn(|input| input["amount"].as_u64() > Some(100));
        assert!(tool.needs_approval(&json!({"amount": 500})));
        assert!(!tool.needs_approval(&json!({"amount": 5})));
        assert!(Tool::new(json!({})).with_needs_approval(true).needs_approval(&json!({})));
    }

    #[test]
    fn input_validation() {
        let tool = weather();
        assert!(tool.validate_input(&json!({"city": "Paris"})).is_ok());
        assert!(tool.validate_input(&json!({"town": "Paris"})).is_err());
    }

    #[tokio::test]
    async fn fn_executor_returns_output() {
        let tool = weather();
        let options = ToolCallOptions {
            tool_call_id: "c1".into(),
            messages: vec![],
            cancel: CancelHandle::new(),
            context: None,
        };
        let executed = tool
            .executor()
            .unwrap()
            .execute(json!({"city": "Paris"}), options)
            .await
            .unwrap();
        match executed {
            ToolExecution::Output(value) => assert_eq!(value["temp"], 21),
            ToolExecution::Streaming(_) => panic!("expected a single output"),
        }
    }
}
