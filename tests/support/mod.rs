//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{Value, json};
use stepstream::prelude::*;
use stepstream::testing::{MockLanguageModel, MockStep};
use stepstream::tool::ToolCallOptions;

/// Options for `model` with retries disabled.
pub fn options(model: &Arc<MockLanguageModel>) -> StreamTextOptions {
    let model: Arc<dyn LanguageModel> = model.clone();
    StreamTextOptions::new(model).with_retry(RetryPolicy::none())
}

pub fn mock(steps: Vec<MockStep>) -> Arc<MockLanguageModel> {
    Arc::new(MockLanguageModel::new(steps))
}

/// Every part of the run.
pub async fn collect_parts(result: &StreamTextResult) -> Vec<StreamPart> {
    result.full_stream().collect().await
}

pub fn type_names(parts: &[StreamPart]) -> Vec<&'static str> {
    parts.iter().map(StreamPart::type_name).collect()
}

/// The `getItemId` tool, always answering `"item_1"`.
pub fn get_item_id_tool() -> Tool {
    Tool::new(json!({
        "type": "object",
        "properties": { "name": { "type": "string" } }
    }))
    .with_description("Look up the id of an item")
    .with_execute(|_input: Value, _options: ToolCallOptions| async move { Ok(json!("item_1")) })
}
