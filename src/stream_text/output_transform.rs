//! Attaches partial structured output to the part stream.

use serde_json::Value;

use crate::output::Output;
use crate::streaming::StreamPart;

/// A part plus the partial output it produced, if it changed the output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EnrichedPart {
    pub part: StreamPart,
    pub partial_output: Option<Value>,
}

/// Feeds the first text unit of every step to the output parser.
///
/// Later text units of the same step pass through untouched. A partial is
/// published only when its serialization differs from the last published
/// one, which also holds across step boundaries.
pub(crate) struct OutputTransform {
    output: Output,
    text: String,
    text_id: Option<String>,
    last_published: Option<String>,
}

impl OutputTransform {
    pub fn new(output: Output) -> Self {
        Self {
            output,
            text: String::new(),
            text_id: None,
            last_published: None,
        }
    }

    pub fn process(&mut self, part: &StreamPart) -> Option<Value> {
        match part {
            StreamPart::StartStep { .. } => {
                self.text.clear();
                self.text_id = None;
                None
            }
            StreamPart::TextStart { id, .. } => {
                if self.text_id.is_none() {
                    self.text_id = Some(id.clone());
                }
                None
            }
            StreamPart::TextDelta { id, text } if self.text_id.as_deref() == Some(id.as_str()) => {
                if text.is_empty() {
                    return None;
                }
                self.text.push_str(text);
                self.publish()
            }
            _ => None,
        }
    }

    fn publish(&mut self) -> Option<Value> {
        let partial = self.output.parse_partial(&self.text)?;
        let serialized = serde_json::to_string(&partial).ok()?;
        if self.last_published.as_deref() == Some(serialized.as_str()) {
            return None;
        }
        self.last_published = Some(serialized);
        Some(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestMetadata;
    use serde_json::json;

    fn delta(id: &str, text: &str) -> StreamPart {
        StreamPart::TextDelta {
            id: id.into(),
            text: text.into(),
        }
    }

    fn text_start(id: &str) -> StreamPart {
        StreamPart::TextStart {
            id: id.into(),
            provider_metadata: None,
        }
    }

    #[test]
    fn only_changed_partials_are_published() {
        let mut transform = OutputTransform::new(Output::object(json!({"type": "object"})));
        let published: Vec<_> = [
            text_start("t0"),
            delta("t0", "{\"na"),
            delta("t0", "me\": \"A"),
            delta("t0", "da\""),
            delta("t0", ", \"ag"),
            delta("t0", "e\": 36}"),
        ]
        .iter()
        .filter_map(|part| transform.process(part))
        .collect();
        assert_eq!(
            published,
            vec![
                json!({}),
                json!({"name": "A"}),
                json!({"name": "Ada"}),
                json!({"name": "Ada", "age": 36}),
            ]
        );
    }

    #[test]
    fn second_text_unit_is_ignored() {
        let mut transform = OutputTransform::new(Output::text());
        assert_eq!(transform.process(&text_start("a")), None);
        assert_eq!(transform.process(&delta("a", "Hi")), Some(json!("Hi")));
        transform.process(&text_start("b"));
        assert_eq!(transform.process(&delta("b", "ignored")), None);
        assert_eq!(transform.process(&delta("a", "!")), Some(json!("Hi!")));
    }

    #[test]
    fn start_step_resets_the_text() {
        let mut transform = OutputTransform::new(Output::text());
        transform.process(&text_start("a"));
        transform.process(&delta("a", "one"));
        transform.process(&StreamPart::StartStep {
            request: RequestMetadata::default(),
            warnings: vec![],
        });
        transform.process(&text_start("b"));
        assert_eq!(transform.process(&delta("b", "two")), Some(json!("two")));
    }
}
