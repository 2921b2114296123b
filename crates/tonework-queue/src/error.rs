//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Topology declaration failed: {0}")]
    TopologyFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Acknowledgement failed for delivery {delivery_tag}: {message}")]
    AckFailed { delivery_tag: u64, message: String },

    #[error("Broker unreachable after {attempts} consecutive attempts")]
    RetriesExhausted { attempts: u32 },

}

impl QueueError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn topology_failed(msg: impl Into<String>) -> Self {
        Self::TopologyFailed(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    pub fn ack_failed(delivery_tag: u64, msg: impl Into<String>) -> Self {
        Self::AckFailed {
            delivery_tag,
            message: msg.into(),
        }
    }
}
