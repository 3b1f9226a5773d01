//! Scripted model for tests.
//!
//! [`MockLanguageModel`] replays one script per model call, in order, and
//! records every request it receives.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::{StreamExt, stream};

use crate::error::LlmError;
use crate::model::{
    LanguageModel, LanguageModelRequest, ModelStreamEvent, ModelStreamResponse, ModelToolCall,
};
use crate::types::{FinishReason, Usage};
use crate::utils::{CancelHandle, lock};

/// Behavior of one model call.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Emit the events, then end the stream.
    Events(Vec<ModelStreamEvent>),
    /// Emit the events, then stay open until dropped.
    Hang(Vec<ModelStreamEvent>),
    /// Fail the handshake.
    Fail(LlmError),
}

pub struct MockLanguageModel {
    provider: String,
    model_id: String,
    script: Mutex<VecDeque<MockStep>>,
    requests: Mutex<Vec<LanguageModelRequest>>,
}

impl MockLanguageModel {
    pub fn new(script: Vec<MockStep>) -> Self {
        Self {
            provider: "mock".to_string(),
            model_id: "mock-model".to_string(),
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A model whose calls all stream the given events, one script per call.
    pub fn with_steps(steps: Vec<Vec<ModelStreamEvent>>) -> Self {
        Self::new(steps.into_iter().map(MockStep::Events).collect())
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<LanguageModelRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn do_stream(
        &self,
        request: LanguageModelRequest,
        _cancel: CancelHandle,
    ) -> Result<ModelStreamResponse, LlmError> {
        lock(&self.requests).push(request);
        let step = lock(&self.script).pop_front().ok_or_else(|| {
            LlmError::InternalError("mock model has no scripted response left".into())
        })?;
        let stream = match step {
            MockStep::Fail(error) => return Err(error),
            MockStep::Events(events) => stream::iter(events.into_iter().map(Ok)).boxed(),
            MockStep::Hang(events) => stream::iter(events.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed(),
        };
        Ok(ModelStreamResponse::new(stream))
    }
}

/// Events of a call that streams `deltas` as one text unit.
pub fn text_events(deltas: &[&str], usage: Usage) -> Vec<ModelStreamEvent> {
    let mut events = vec![
        ModelStreamEvent::StreamStart { warnings: vec![] },
        ModelStreamEvent::TextStart {
            id: "t0".into(),
            provider_metadata: None,
        },
    ];
    events.extend(deltas.iter().map(|delta| ModelStreamEvent::TextDelta {
        id: "t0".into(),
        delta: (*delta).to_string(),
    }));
    events.push(ModelStreamEvent::TextEnd { id: "t0".into() });
    events.push(finish_event(FinishReason::Stop, usage));
    events
}

/// Events of a call that requests the given `(id, tool, json input)` calls.
pub fn tool_call_events(calls: &[(&str, &str, &str)], usage: Usage) -> Vec<ModelStreamEvent> {
    let mut events = vec![ModelStreamEvent::StreamStart { warnings: vec![] }];
    for (id, tool_name, input) in calls {
        events.push(ModelStreamEvent::ToolInputStart {
            id: (*id).to_string(),
            tool_name: (*tool_name).to_string(),
            provider_executed: false,
        });
        events.push(ModelStreamEvent::ToolInputDelta {
            id: (*id).to_string(),
            delta: (*input).to_string(),
        });
        events.push(ModelStreamEvent::ToolInputEnd {
            id: (*id).to_string(),
        });
        events.push(ModelStreamEvent::ToolCall(ModelToolCall::new(
            *id, *tool_name, *input,
        )));
    }
    events.push(finish_event(FinishReason::ToolCalls, usage));
    events
}

pub fn finish_event(finish_reason: FinishReason, usage: Usage) -> ModelStreamEvent {
    ModelStreamEvent::Finish {
        finish_reason,
        usage,
        provider_metadata: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_scripts_in_order() {
        let model = MockLanguageModel::new(vec![
            MockStep::Events(text_events(&["hi"], Usage::new(1, 1))),
            MockStep::Fail(LlmError::api(503, "overloaded")),
        ]);
        let request = LanguageModelRequest {
            prompt: vec![],
            tools: vec![],
            tool_choice: None,
            settings: Default::default(),
            response_format: None,
            include_raw_chunks: false,
        };

        let response = model
            .do_stream(request.clone(), CancelHandle::new())
            .await
            .unwrap();
        let events: Vec<_> = response.stream.collect().await;
        assert_eq!(events.len(), 5);

        let second = model.do_stream(request.clone(), CancelHandle::new()).await;
        assert!(matches!(second, Err(LlmError::ApiError { code: 503, .. })));
        assert!(matches!(
            model.do_stream(request, CancelHandle::new()).await,
            Err(LlmError::InternalError(_))
        ));
        assert_eq!(model.call_count(), 3);
    }
}
