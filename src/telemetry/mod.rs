//! Telemetry and tracing
//!
//! Runs are observed through `tracing` spans. When [`TelemetrySettings`] is
//! enabled, every run opens a `stream_text` span and every step a
//! `stream_text.step` span; both carry the model identity and, when
//! `record_outputs` is set, finish reason and token usage.
//!
//! With the `telemetry` feature, [`subscriber`] installs a `tracing-subscriber`
//! configured from code or from `STEPSTREAM_LOG_LEVEL` / `STEPSTREAM_LOG_FORMAT`.

#[cfg(feature = "telemetry")]
pub mod subscriber;

#[cfg(feature = "telemetry")]
pub use subscriber::{OutputFormat, SubscriberConfig, init_from_env, init_subscriber};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::types::{FinishReason, Usage};

/// Per-run telemetry settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// Enable or disable spans for this run
    pub is_enabled: bool,
    /// Record the prompt size on the run span
    pub record_inputs: bool,
    /// Record finish reasons and usage on step and run spans
    pub record_outputs: bool,
    /// Function identifier for grouping telemetry data
    pub function_id: Option<String>,
    /// Additional metadata, logged when the run span opens
    pub metadata: HashMap<String, String>,
}

impl TelemetrySettings {
    /// Enabled settings recording inputs and outputs.
    pub fn enabled() -> Self {
        Self {
            is_enabled: true,
            record_inputs: true,
            record_outputs: true,
            ..Default::default()
        }
    }

    pub fn with_function_id(mut self, function_id: impl Into<String>) -> Self {
        self.function_id = Some(function_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_record_inputs(mut self, record: bool) -> Self {
        self.record_inputs = record;
        self
    }

    pub fn with_record_outputs(mut self, record: bool) -> Self {
        self.record_outputs = record;
        self
    }

    /// Span covering a whole run, or a disabled span.
    pub(crate) fn run_span(&self, provider: &str, model_id: &str, message_count: usize) -> Span {
        if !self.is_enabled {
            return Span::none();
        }
        let span = tracing::info_span!(
            "stream_text",
            provider = provider,
            model = model_id,
            function_id = self.function_id.as_deref().unwrap_or(""),
            messages = tracing::field::Empty,
            finish_reason = tracing::field::Empty,
            input_tokens = tracing::field::Empty,
            output_tokens = tracing::field::Empty,
        );
        if self.record_inputs {
            span.record("messages", message_count);
        }
        if !self.metadata.is_empty() {
            tracing::debug!(parent: &span, metadata = ?self.metadata, "telemetry metadata");
        }
        span
    }

    /// Span covering one model call inside `parent`.
    pub(crate) fn step_span(&self, parent: &Span, step_number: usize, model_id: &str) -> Span {
        if !self.is_enabled {
            return Span::none();
        }
        tracing::info_span!(
            parent: parent,
            "stream_text.step",
            step = step_number,
            model = model_id,
            finish_reason = tracing::field::Empty,
            input_tokens = tracing::field::Empty,
            output_tokens = tracing::field::Empty,
        )
    }

    /// Record the outcome of a step or run on `span`.
    pub(crate) fn record_outcome(&self, span: &Span, finish_reason: &FinishReason, usage: &Usage) {
        if !self.is_enabled || !self.record_outputs {
            return;
        }
        span.record("finish_reason", finish_reason.as_str());
        if let Some(tokens) = usage.input_tokens {
            span.record("input_tokens", tokens);
        }
        if let Some(tokens) = usage.output_tokens {
            span.record("output_tokens", tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_settings_produce_disabled_spans() {
        let settings = TelemetrySettings::default();
        assert!(settings.run_span("mock", "m", 1).is_disabled());
    }

    #[test]
    fn builder_sets_fields() {
        let settings = TelemetrySettings::enabled()
            .with_function_id("chat")
            .with_metadata("tenant", "acme")
            .with_record_inputs(false);
        assert!(settings.is_enabled);
        assert!(!settings.record_inputs);
        assert_eq!(settings.function_id.as_deref(), Some("chat"));
        assert_eq!(settings.metadata.get("tenant").map(String::as_str), Some("acme"));
    }
}
