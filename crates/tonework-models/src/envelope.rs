//! Outbound result envelope (wire format).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ProcessingResult, TaskId};

/// Status tag carried by every result message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
    /// Unexpected worker failure; the inbound message was dropped.
    CriticalError,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Error => "error",
            ResultStatus::CriticalError => "critical_error",
        }
    }
}

/// Result message published to the outbound exchange.
///
/// The fields of the processing result are flattened into the top level:
/// `output_bucket_name` / `output_object_name` / `message` on success,
/// `error_message` / `details` on error.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ResultEnvelope {
    pub task_id: TaskId,
    pub status: ResultStatus,
    pub service: String,
    #[serde(flatten)]
    pub body: EnvelopeBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum EnvelopeBody {
    Success {
        output_bucket_name: String,
        output_object_name: String,
        message: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Error {
        error_message: String,
        details: Map<String, Value>,
    },
}

impl ResultEnvelope {
    /// Build the envelope for a processing result.
    pub fn from_result(task_id: TaskId, service: impl Into<String>, result: &ProcessingResult) -> Self {
        let (status, body) = match result {
            ProcessingResult::Success {
                output_bucket,
                output_object,
                message,
                extra,
            } => (
                ResultStatus::Success,
                EnvelopeBody::Success {
                    output_bucket_name: output_bucket.clone(),
                    output_object_name: output_object.clone(),
                    message: message.clone(),
                    extra: extra.clone(),
                },
            ),
            ProcessingResult::Error { message, details } => (
                ResultStatus::Error,
                EnvelopeBody::Error {
                    error_message: message.clone(),
                    details: details.clone(),
                },
            ),
        };

        Self {
            task_id,
            status,
            service: service.into(),
            body,
        }
    }

    /// Envelope for an unexpected worker failure.
    pub fn critical(task_id: TaskId, service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id,
            status: ResultStatus::CriticalError,
            service: service.into(),
            body: EnvelopeBody::Error {
                error_message: message.into(),
                details: Map::new(),
            },
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
