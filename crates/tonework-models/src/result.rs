//! Processing results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of one task, produced by the task processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessingResult {
    Success {
        output_bucket: String,
        output_object: String,
        message: String,
        /// Tool-specific result fields (e.g. transcript text).
        #[serde(default)]
        extra: Map<String, Value>,
    },
    Error {
        message: String,
        #[serde(default)]
        details: Map<String, Value>,
    },
}

impl ProcessingResult {
    pub fn success(
        output_bucket: impl Into<String>,
        output_object: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Success {
            output_bucket: output_bucket.into(),
            output_object: output_object.into(),
            message: message.into(),
            extra: Map::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn error_with_details(message: impl Into<String>, details: Map<String, Value>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }

    /// Attach tool-specific fields to a success result. No-op on errors.
    pub fn with_extra(mut self, fields: Map<String, Value>) -> Self {
        if let Self::Success { extra, .. } = &mut self {
            extra.extend(fields);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Success { message, .. } | Self::Error { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_extra_only_touches_success() {
        let mut fields = Map::new();
        fields.insert("full_text".into(), json!("hello"));

        let ok = ProcessingResult::success("b", "k", "done").with_extra(fields.clone());
        match ok {
            ProcessingResult::Success { extra, .. } => assert_eq!(extra["full_text"], "hello"),
            _ => panic!("expected success"),
        }

        let err = ProcessingResult::error("boom").with_extra(fields);
        assert_eq!(err, ProcessingResult::error("boom"));
    }
}
