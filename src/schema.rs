//! JSON Schema validation shared by tool inputs and structured output.

use std::sync::Arc;

use serde_json::Value;

/// A schema compiled once and reused for many instances.
///
/// Non-object schemas (for example `true` or `null`) accept everything.
#[derive(Clone)]
pub struct SchemaValidator {
    compiled: Option<Arc<jsonschema::Validator>>,
    compile_error: Option<String>,
}

impl SchemaValidator {
    pub fn new(schema: &Value) -> Self {
        if !schema.is_object() {
            return Self {
                compiled: None,
                compile_error: None,
            };
        }
        match jsonschema::validator_for(schema) {
            Ok(validator) => Self {
                compiled: Some(Arc::new(validator)),
                compile_error: None,
            },
            Err(e) => Self {
                compiled: None,
                compile_error: Some(format!("Invalid JSON Schema: {}", e)),
            },
        }
    }

    /// Validate `instance`, returning up to three error messages joined by `; `.
    pub fn validate(&self, instance: &Value) -> Result<(), String> {
        if let Some(err) = &self.compile_error {
            return Err(err.clone());
        }
        let Some(validator) = &self.compiled else {
            return Ok(());
        };
        if validator.validate(instance).is_err() {
            let mut msgs = Vec::new();
            for err in validator.iter_errors(instance) {
                msgs.push(format!("{} at {}", err, err.instance_path));
                if msgs.len() >= 3 {
                    break;
                }
            }
            return Err(msgs.join("; "));
        }
        Ok(())
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validate(instance).is_ok()
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("compiled", &self.compiled.is_some())
            .field("compile_error", &self.compile_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_against_object_schema() {
        let validator = SchemaValidator::new(&json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        }));
        assert!(validator.is_valid(&json!({"name": "Alice"})));
        let err = validator.validate(&json!({"age": 3})).unwrap_err();
        assert!(err.contains("name"));
    }

    #[test]
    fn non_object_schema_accepts_anything() {
        let validator = SchemaValidator::new(&json!(true));
        assert!(validator.is_valid(&json!(42)));
    }

    #[test]
    fn invalid_schema_reports_compile_error() {
        let validator = SchemaValidator::new(&json!({"type": 12}));
        assert!(validator.validate(&json!({})).unwrap_err().contains("Invalid JSON Schema"));
    }
}
