mod support;

use futures::StreamExt;
use serde_json::{Value, json};
use stepstream::model::{ModelStreamEvent, ResponseFormat};
use stepstream::prelude::*;
use stepstream::testing::{MockStep, finish_event, text_events};
use support::{mock, options};

fn person() -> Output {
    Output::object(json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "age": { "type": "integer" }
        },
        "required": ["name", "age"]
    }))
}

#[tokio::test]
async fn partial_outputs_grow_and_never_repeat() {
    let model = mock(vec![MockStep::Events(text_events(
        &["{\"name\": \"A", "", "da\"", " ", ", \"age\": 3", "6}"],
        Usage::new(5, 9),
    ))]);
    let result = stream_text(options(&model).with_prompt("who?").with_output(person())).unwrap();

    let partials: Vec<Value> = result.partial_output_stream().collect().await;
    assert_eq!(
        partials,
        vec![
            json!({"name": "A"}),
            json!({"name": "Ada"}),
            json!({"name": "Ada", "age": 3}),
            json!({"name": "Ada", "age": 36}),
        ]
    );
    assert!(partials.windows(2).all(|pair| pair[0] != pair[1]));
    assert_eq!(result.output().await.unwrap(), json!({"name": "Ada", "age": 36}));

    let request = &model.requests()[0];
    assert!(matches!(
        &request.response_format,
        Some(ResponseFormat::Json { schema: Some(_), .. })
    ));
}

#[tokio::test]
async fn unparsable_text_is_an_output_parse_error() {
    let model = mock(vec![MockStep::Events(text_events(&["not json"], Usage::new(1, 2)))]);
    let result = stream_text(options(&model).with_prompt("who?").with_output(person())).unwrap();

    match result.output().await {
        Err(LlmError::OutputParseError { text, context, .. }) => {
            assert_eq!(text, "not json");
            assert_eq!(context.usage, Usage::new(1, 2));
            assert_eq!(context.finish_reason, FinishReason::Stop);
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn schema_mismatch_is_an_output_validation_error() {
    let model = mock(vec![MockStep::Events(text_events(
        &[r#"{"name": "Ada"}"#],
        Usage::new(1, 2),
    ))]);
    let result = stream_text(options(&model).with_prompt("who?").with_output(person())).unwrap();

    assert!(matches!(
        result.output().await,
        Err(LlmError::OutputValidationError { .. })
    ));
    // The run itself succeeded.
    assert_eq!(result.finish_reason().await.unwrap(), FinishReason::Stop);
}

#[tokio::test]
async fn generate_text_returns_the_parsed_output() {
    let model = mock(vec![MockStep::Events(text_events(
        &[r#"{"elements": [1, 2, 3]}"#],
        Usage::new(1, 2),
    ))]);
    let outcome = generate_text(
        options(&model)
            .with_prompt("count")
            .with_output(Output::array(json!({"type": "integer"}))),
    )
    .await
    .unwrap();
    assert_eq!(outcome.output, Some(json!([1, 2, 3])));
}

#[tokio::test]
async fn text_output_has_no_response_format() {
    let model = mock(vec![MockStep::Events(text_events(&["He", "y"], Usage::new(1, 2)))]);
    let result = stream_text(options(&model).with_prompt("hi")).unwrap();

    let partials: Vec<Value> = result.partial_output_stream().collect().await;
    assert_eq!(partials, vec![json!("He"), json!("Hey")]);
    assert_eq!(result.output().await.unwrap(), json!("Hey"));
    assert_eq!(model.requests()[0].response_format, None);
}

fn text_unit(id: &str, delta: &str) -> Vec<ModelStreamEvent> {
    vec![
        ModelStreamEvent::TextStart {
            id: id.into(),
            provider_metadata: None,
        },
        ModelStreamEvent::TextDelta {
            id: id.into(),
            delta: delta.into(),
        },
        ModelStreamEvent::TextEnd { id: id.into() },
    ]
}

#[tokio::test]
async fn output_is_read_from_the_first_text_unit_only() {
    let mut events = vec![ModelStreamEvent::StreamStart { warnings: vec![] }];
    events.extend(text_unit("a", r#"{"name": "Ada", "age": 36}"#));
    events.extend(text_unit("b", "Hope that helps."));
    events.push(finish_event(FinishReason::Stop, Usage::new(3, 4)));
    let model = mock(vec![MockStep::Events(events)]);
    let result = stream_text(options(&model).with_prompt("who?").with_output(person())).unwrap();

    let partials: Vec<Value> = result.partial_output_stream().collect().await;
    assert_eq!(partials, vec![json!({"name": "Ada", "age": 36})]);
    assert_eq!(result.output().await.unwrap(), json!({"name": "Ada", "age": 36}));
    assert_eq!(
        result.text().await.unwrap(),
        r#"{"name": "Ada", "age": 36}Hope that helps."#
    );
}
