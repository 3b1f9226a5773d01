//! stepstream
//!
//! Streaming multi-step tool calling for language models. A run repeatedly
//! calls a model, executes the tools it asks for, decides whether to
//! continue, and exposes everything as one ordered, cancellable event stream
//! that any number of consumers can read independently.
//!
//! ```rust,ignore
//! use stepstream::prelude::*;
//!
//! let result = stream_text(
//!     StreamTextOptions::new(model)
//!         .with_prompt("What is the weather in Paris?")
//!         .with_tool("weather", weather_tool)
//!         .with_stop_when(step_count_is(3)),
//! )?;
//!
//! let mut text = result.text_stream();
//! while let Some(delta) = text.next().await {
//!     print!("{delta}");
//! }
//! let usage = result.total_usage().await?;
//! ```
#![deny(unsafe_code)]

pub mod error;
pub mod messages;
pub mod model;
pub mod output;
pub mod prepare_step;
pub mod retry;
pub mod schema;
pub mod step;
pub mod stop_condition;
pub mod stream_text;
pub mod streaming;
pub mod telemetry;
pub mod testing;
pub mod tool;
pub mod types;
pub mod ui;
pub mod utils;

pub use error::LlmError;
pub use stream_text::{
    GenerateTextResult, StreamTextOptions, StreamTextResult, generate_text, stream_text,
};

/// The names most runs need.
pub mod prelude {
    pub use crate::error::LlmError;
    pub use crate::model::{CallSettings, LanguageModel, ToolChoice};
    pub use crate::output::Output;
    pub use crate::prepare_step::PrepareStepResult;
    pub use crate::retry::RetryPolicy;
    pub use crate::step::StepResult;
    pub use crate::stop_condition::{
        StopCondition, all_of, any_of, has_no_tool_calls, has_text_response, has_tool_call,
        has_tool_result, step_count_is,
    };
    pub use crate::stream_text::{
        FinishEvent, GenerateTextResult, StreamTextOptions, StreamTextResult, generate_text,
        stream_text,
    };
    pub use crate::streaming::StreamPart;
    pub use crate::telemetry::TelemetrySettings;
    pub use crate::tool::{Tool, ToolSet};
    pub use crate::types::{FinishReason, ModelMessage, Usage};
    pub use crate::ui::{UiMessageChunk, UiStreamOptions};
    pub use crate::utils::CancelHandle;
    pub use futures::StreamExt;
}
