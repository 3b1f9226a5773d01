//! Output modes: how the text of a step becomes a typed result.
//!
//! Every [`Output`] offers two operations over the running text:
//! [`Output::parse_partial`] (best effort, tolerant of truncation, used while
//! streaming) and [`Output::parse_complete`] (strict parse plus validation,
//! used once at the end). Plain text mode makes both the identity.

pub mod json_repair;

use serde_json::{Value, json};

use crate::error::{LlmError, OutputErrorContext};
use crate::model::ResponseFormat;
use crate::schema::SchemaValidator;
use json_repair::{PartialJson, parse_partial_json, strip_markdown_fence};

/// Requested output shape.
#[derive(Debug, Clone, Default)]
pub enum Output {
    /// Plain text.
    #[default]
    Text,
    /// A JSON object matching `schema`.
    Object {
        schema: Value,
        validator: SchemaValidator,
        name: Option<String>,
        description: Option<String>,
    },
    /// An array of elements matching `element_schema`, sent to the model as
    /// `{"elements": [...]}`.
    Array {
        element_schema: Value,
        validator: SchemaValidator,
    },
    /// One of a fixed set of strings, sent to the model as `{"result": "..."}`.
    Choice { options: Vec<String> },
    /// Any JSON value.
    Json,
}

impl Output {
    pub fn text() -> Self {
        Self::Text
    }

    pub fn object(schema: Value) -> Self {
        Self::Object {
            validator: SchemaValidator::new(&schema),
            schema,
            name: None,
            description: None,
        }
    }

    pub fn array(element_schema: Value) -> Self {
        Self::Array {
            validator: SchemaValidator::new(&element_schema),
            element_schema,
        }
    }

    pub fn choice<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Choice {
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    pub fn json() -> Self {
        Self::Json
    }

    /// Name and description forwarded to the model for object outputs.
    pub fn with_name(mut self, new_name: impl Into<String>) -> Self {
        if let Self::Object { name, .. } = &mut self {
            *name = Some(new_name.into());
        }
        self
    }

    pub fn with_description(mut self, new_description: impl Into<String>) -> Self {
        if let Self::Object { description, .. } = &mut self {
            *description = Some(new_description.into());
        }
        self
    }

    /// Response format hint for the model request.
    pub fn response_format(&self) -> ResponseFormat {
        match self {
            Self::Text => ResponseFormat::Text,
            Self::Object {
                schema,
                name,
                description,
                ..
            } => ResponseFormat::Json {
                schema: Some(schema.clone()),
                name: name.clone(),
                description: description.clone(),
            },
            Self::Array { element_schema, .. } => ResponseFormat::Json {
                schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "elements": { "type": "array", "items": element_schema }
                    },
                    "required": ["elements"],
                    "additionalProperties": false
                })),
                name: None,
                description: None,
            },
            Self::Choice { options } => ResponseFormat::Json {
                schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "result": { "type": "string", "enum": options }
                    },
                    "required": ["result"],
                    "additionalProperties": false
                })),
                name: None,
                description: None,
            },
            Self::Json => ResponseFormat::Json {
                schema: None,
                name: None,
                description: None,
            },
        }
    }

    /// Best-effort value for the text received so far.
    pub fn parse_partial(&self, text: &str) -> Option<Value> {
        match self {
            Self::Text => Some(Value::String(text.to_string())),
            Self::Json => parse_partial_json(Some(text)).into_value(),
            Self::Object { .. } => parse_partial_json(Some(text))
                .into_value()
                .filter(Value::is_object),
            Self::Array { .. } => {
                let parsed = parse_partial_json(Some(text));
                let repaired = matches!(parsed, PartialJson::Repaired(_));
                let mut elements = match parsed.into_value()? {
                    Value::Object(mut map) => match map.remove("elements") {
                        Some(Value::Array(elements)) => elements,
                        _ => return None,
                    },
                    _ => return None,
                };
                // The last element of a repaired prefix may still be growing.
                if repaired && !elements.is_empty() {
                    elements.pop();
                }
                Some(Value::Array(elements))
            }
            Self::Choice { options } => {
                let parsed = parse_partial_json(Some(text));
                let successful = matches!(parsed, PartialJson::Successful(_));
                let result = parsed.value()?.get("result")?.as_str()?.to_string();
                let candidates: Vec<&String> =
                    options.iter().filter(|o| o.starts_with(&result)).collect();
                if successful {
                    candidates
                        .contains(&&result)
                        .then(|| Value::String(result))
                } else if candidates.len() == 1 {
                    Some(Value::String(candidates[0].clone()))
                } else {
                    None
                }
            }
        }
    }

    /// Strict parse and validation of the final text.
    pub fn parse_complete(&self, text: &str, context: &OutputErrorContext) -> Result<Value, LlmError> {
        let parse_error = |message: String| LlmError::OutputParseError {
            text: text.to_string(),
            message,
            context: Box::new(context.clone()),
        };
        let validation_error = |message: String| LlmError::OutputValidationError {
            text: text.to_string(),
            message,
            context: Box::new(context.clone()),
        };

        if let Self::Text = self {
            return Ok(Value::String(text.to_string()));
        }

        let value: Value = serde_json::from_str(strip_markdown_fence(text))
            .map_err(|e| parse_error(e.to_string()))?;

        match self {
            Self::Text | Self::Json => Ok(value),
            Self::Object { validator, .. } => {
                validator.validate(&value).map_err(validation_error)?;
                Ok(value)
            }
            Self::Array { validator, .. } => {
                let Some(Value::Array(elements)) = value.get("elements") else {
                    return Err(validation_error(
                        "value must be an object with an \"elements\" array".into(),
                    ));
                };
                for element in elements {
                    validator.validate(element).map_err(validation_error)?;
                }
                Ok(Value::Array(elements.clone()))
            }
            Self::Choice { options } => match value.get("result").and_then(Value::as_str) {
                Some(result) if options.iter().any(|o| o == result) => {
                    Ok(Value::String(result.to_string()))
                }
                _ => Err(validation_error(format!(
                    "value must be an object with a \"result\" among: {}",
                    options.join(", ")
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn text_mode_is_identity() {
        let ctx = OutputErrorContext::default();
        assert_eq!(Output::text().parse_partial("Hel"), Some(json!("Hel")));
        assert_eq!(Output::text().parse_complete("Hello", &ctx).unwrap(), json!("Hello"));
    }

    #[test]
    fn object_partials_follow_the_prefix() {
        let output = person();
        assert_eq!(output.parse_partial(""), None);
        assert_eq!(output.parse_partial("{\"na"), Some(json!({})));
        assert_eq!(output.parse_partial("{\"name\": \"Ad"), Some(json!({"name": "Ad"})));
    }

    #[test]
    fn object_complete_validates() {
        let ctx = OutputErrorContext::default();
        let output = person();
        assert_eq!(
            output.parse_complete("{\"name\":\"Ada\",\"age\":36}", &ctx).unwrap(),
            json!({"name": "Ada", "age": 36})
        );
        assert!(matches!(
            output.parse_complete("{\"name\":\"Ada\"", &ctx),
            Err(LlmError::OutputParseError { .. })
        ));
        match output.parse_complete("{\"name\":\"Ada\"}", &ctx) {
            Err(LlmError::OutputValidationError { text, .. }) => assert_eq!(text, "{\"name\":\"Ada\"}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn array_partials_drop_the_growing_element() {
        let output = Output::array(json!({"type": "integer"}));
        assert_eq!(output.parse_partial("{\"elements\": [1, 2, 3"), Some(json!([1, 2])));
        assert_eq!(output.parse_partial("{\"elements\": [1, 2, 3]}"), Some(json!([1, 2, 3])));
        let ctx = OutputErrorContext::default();
        assert_eq!(
            output.parse_complete("{\"elements\": [4, 5]}", &ctx).unwrap(),
            json!([4, 5])
        );
        assert!(output.parse_complete("{\"elements\": [\"x\"]}", &ctx).is_err());
    }

    #[test]
    fn choice_partials_resolve_unambiguous_prefixes() {
        let output = Output::choice(["sunny", "snowy", "rainy"]);
        assert_eq!(output.parse_partial("{\"result\": \"r"), Some(json!("rainy")));
        assert_eq!(output.parse_partial("{\"result\": \"s"), None);
        assert_eq!(output.parse_partial("{\"result\": \"sunny\"}"), Some(json!("sunny")));
        let ctx = OutputErrorContext::default();
        assert!(output.parse_complete("{\"result\": \"foggy\"}", &ctx).is_err());
    }

    #[test]
    fn fenced_json_is_accepted() {
        let ctx = OutputErrorContext::default();
        assert_eq!(
            Output::json().parse_complete("```json\n[1,2]\n```", &ctx).unwrap(),
            json!([1, 2])
        );
    }

    #[test]
    fn response_format_for_objects_carries_schema() {
        match person().with_name("person").response_format() {
            ResponseFormat::Json { schema, name, .. } => {
                assert!(schema.is_some());
                assert_eq!(name.as_deref(), Some("person"));
            }
            ResponseFormat::Text => panic!("expected json format"),
        }
    }
}
