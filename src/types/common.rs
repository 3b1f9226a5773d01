//! Common enums and metadata types shared by the model interface, the stream
//! parts and the step results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Provider metadata keyed by provider name.
///
/// Kept permissive to preserve vendor-specific data for forward compatibility.
pub type ProviderMetadata = serde_json::Map<String, serde_json::Value>;

/// Warning from the model provider.
///
/// Warnings indicate non-fatal issues during generation, such as unsupported settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Warning {
    /// An unsupported setting was provided
    UnsupportedSetting {
        setting: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    /// An unsupported tool was provided
    UnsupportedTool {
        tool_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    /// Other warning types
    Other { message: String },
}

impl Warning {
    /// Create an unsupported setting warning
    pub fn unsupported_setting(
        setting: impl Into<String>,
        details: Option<impl Into<String>>,
    ) -> Self {
        Self::UnsupportedSetting {
            setting: setting.into(),
            details: details.map(|d| d.into()),
        }
    }

    /// Create a generic warning
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Reason why the model stopped generating tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// Model generated stop sequence or completed naturally.
    Stop,
    /// Model reached the maximum number of tokens.
    Length,
    /// Model triggered tool calls.
    ToolCalls,
    /// Content was filtered due to safety/policy violations.
    ContentFilter,
    /// An error occurred during generation.
    Error,
    /// Other provider-specific finish reason.
    Other,
    /// The provider did not report a reason.
    #[default]
    Unknown,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool-calls",
            Self::ContentFilter => "content-filter",
            Self::Error => "error",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response metadata for one model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResponseMetadata {
    /// Response ID
    pub id: Option<String>,
    /// Model that produced the response
    pub model_id: Option<String>,
    /// Creation time
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    /// Response headers, when the adapter exposes them
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Request metadata for one model call (what was actually sent).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RequestMetadata {
    /// Raw request body as sent by the adapter
    pub body: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_wire_names() {
        assert_eq!(FinishReason::ToolCalls.to_string(), "tool-calls");
        assert_eq!(
            serde_json::to_value(FinishReason::ContentFilter).unwrap(),
            serde_json::json!("content-filter")
        );
        assert_eq!(FinishReason::default(), FinishReason::Unknown);
    }

    #[test]
    fn warning_serializes_tagged() {
        let w = Warning::unsupported_setting("topK", Some("not supported"));
        let v = serde_json::to_value(&w).unwrap();
        assert_eq!(v["type"], "unsupported-setting");
        assert_eq!(v["setting"], "topK");
    }
}
