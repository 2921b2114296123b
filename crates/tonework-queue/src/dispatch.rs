//! Sequential message dispatch.
//!
//! [`drive`] pulls one message, hands it to the handler, applies the
//! handler's acknowledgement and only then pulls the next one. The stop
//! signal is observed between messages, so an in-flight task always runs
//! to completion and is acknowledged before the loop exits.

use std::fmt::Display;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::delivery::{Acknowledgement, DeliveryAcker, InboundMessage};
use crate::error::QueueError;
use crate::publisher::ResultPublisher;

/// Per-message entry point.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message and decide its acknowledgement.
    async fn handle(&self, message: &InboundMessage, publisher: &ResultPublisher) -> Acknowledgement;
}

/// Why the dispatch loop stopped.
#[derive(Debug)]
pub enum ConsumeExit {
    /// Stop signal observed between messages.
    Shutdown,
    /// The consumer stream ended (channel or connection closed).
    StreamEnded,
    /// The consumer stream reported an error.
    StreamError(String),
    /// An acknowledgement could not be delivered.
    AckFailed(QueueError),
}

impl ConsumeExit {
    /// Whether the connection must be re-established.
    pub fn is_connection_loss(&self) -> bool {
        !matches!(self, ConsumeExit::Shutdown)
    }
}

/// Consume `stream` until shutdown or connection loss.
pub async fn drive<S, E>(
    mut stream: S,
    handler: &dyn MessageHandler,
    publisher: &ResultPublisher,
    acker: &dyn DeliveryAcker,
    shutdown: &mut watch::Receiver<bool>,
) -> ConsumeExit
where
    S: Stream<Item = Result<InboundMessage, E>> + Unpin,
    E: Display,
{
    loop {
        if *shutdown.borrow() {
            return ConsumeExit::Shutdown;
        }

        let next = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return ConsumeExit::Shutdown;
                }
                continue;
            }
            next = stream.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => return ConsumeExit::StreamError(e.to_string()),
            None => return ConsumeExit::StreamEnded,
        };

        debug!(
            delivery_tag = message.delivery_tag,
            redelivered = message.redelivered,
            "Received message ({} bytes)",
            message.body.len()
        );

        let ack = handler.handle(&message, publisher).await;

        if let Err(e) = acker.apply(message.delivery_tag, ack).await {
            warn!(delivery_tag = message.delivery_tag, "Failed to acknowledge: {}", e);
            return ConsumeExit::AckFailed(e);
        }
        match ack {
            Acknowledgement::Ack => debug!(delivery_tag = message.delivery_tag, "Acked"),
            Acknowledgement::Nack { requeue } => {
                info!(delivery_tag = message.delivery_tag, requeue, "Nacked")
            }
        }
    }
}
