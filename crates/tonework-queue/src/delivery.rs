//! Inbound messages, acknowledgements and the broker-facing seams.
//!
//! [`ResultSink`] and [`DeliveryAcker`] are the only broker operations the
//! message pipeline needs. Both are implemented for `lapin::Channel`;
//! tests substitute in-memory recorders.

use async_trait::async_trait;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicPublishOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::{BasicProperties, Channel};

use crate::error::{QueueError, QueueResult};
use crate::metrics;

/// A message received from the inbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub body: Vec<u8>,
    pub delivery_tag: u64,
    /// Correlation id set by the producer, if any
    pub correlation_id: Option<String>,
    pub redelivered: bool,
}

impl InboundMessage {
    pub fn new(body: impl Into<Vec<u8>>, delivery_tag: u64) -> Self {
        Self {
            body: body.into(),
            delivery_tag,
            correlation_id: None,
            redelivered: false,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

impl From<Delivery> for InboundMessage {
    fn from(delivery: Delivery) -> Self {
        Self {
            correlation_id: delivery
                .properties
                .correlation_id()
                .as_ref()
                .map(|id| id.as_str().to_string()),
            body: delivery.data,
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
        }
    }
}

/// Final disposition of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Ack,
    Nack { requeue: bool },
}

impl Acknowledgement {
    /// Negative acknowledgement that drops the message.
    pub const REJECT: Acknowledgement = Acknowledgement::Nack { requeue: false };
}

/// Publishes serialized results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Publish `payload` persistently with `correlation_id`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        correlation_id: &str,
    ) -> QueueResult<()>;
}

/// Applies acknowledgements to deliveries.
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn apply(&self, delivery_tag: u64, ack: Acknowledgement) -> QueueResult<()>;
}

#[async_trait]
impl ResultSink for Channel {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        correlation_id: &str,
    ) -> QueueResult<()> {
        let confirm = self
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into())
                    .with_correlation_id(correlation_id.into()),
            )
            .await
            .map_err(|e| QueueError::publish_failed(format!("{}: {}", exchange, e)))?;

        let confirmation = confirm
            .await
            .map_err(|e| QueueError::publish_failed(format!("confirmation failed: {}", e)))?;
        match confirmation {
            Confirmation::Nack(_) => Err(QueueError::publish_failed(format!(
                "broker rejected result on {}",
                exchange
            ))),
            // A mandatory message that matched no binding comes back with the ack
            Confirmation::Ack(Some(_)) => Err(QueueError::publish_failed(format!(
                "result unroutable on {} with key {}",
                exchange, routing_key
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DeliveryAcker for Channel {
    async fn apply(&self, delivery_tag: u64, ack: Acknowledgement) -> QueueResult<()> {
        match ack {
            Acknowledgement::Ack => {
                self.basic_ack(delivery_tag, BasicAckOptions::default())
                    .await
                    .map_err(|e| QueueError::ack_failed(delivery_tag, format!("ack failed: {}", e)))?;
                metrics::record_ack();
            }
            Acknowledgement::Nack { requeue } => {
                self.basic_nack(
                    delivery_tag,
                    BasicNackOptions {
                        requeue,
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| QueueError::ack_failed(delivery_tag, format!("nack failed: {}", e)))?;
                metrics::record_nack(requeue);
            }
        }
        Ok(())
    }
}
