//! Model error types.

use thiserror::Error;

use crate::TaskId;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    /// The message body is not a JSON object.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The message is valid JSON but a required field is absent.
    #[error("Invalid task {task_id}: missing '{field}'")]
    MissingField { task_id: TaskId, field: String },
}

impl ModelError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }

    pub fn missing_field(task_id: TaskId, field: impl Into<String>) -> Self {
        Self::MissingField {
            task_id,
            field: field.into(),
        }
    }
}
