//! Task identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe form of the ID.
    ///
    /// Producers choose task IDs freely, so anything outside
    /// `[A-Za-z0-9_-]` is replaced with `_` before the ID is used to
    /// name local files.
    pub fn sanitized(&self) -> String {
        let cleaned: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        if cleaned.is_empty() {
            "task".to_string()
        } else {
            cleaned
        }
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn test_sanitized_strips_path_characters() {
        let id = TaskId::from_string("../etc/passwd");
        assert_eq!(id.sanitized(), "___etc_passwd");

        let id = TaskId::from_string("abc-123_XYZ");
        assert_eq!(id.sanitized(), "abc-123_XYZ");
    }

    #[test]
    fn test_sanitized_never_empty() {
        assert_eq!(TaskId::from_string("").sanitized(), "task");
    }
}
