//! Per-message entry point.
//!
//! Decides, for every inbound message, which result is published and how
//! the delivery is acknowledged:
//!
//! | Situation | Result | Acknowledgement |
//! |-----------|--------|-----------------|
//! | Body is not a JSON object | none | nack, no requeue |
//! | Input object field missing | `error` | ack |
//! | Processed (success or error) | `success` / `error` | ack |
//! | Processing panicked | `critical_error` | nack, no requeue |
//!
//! With at-least-once delivery a result that could not be published turns
//! the ack into a nack with requeue.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, warn};

use tonework_models::{ProcessingResult, TaskParser};
use tonework_queue::{Acknowledgement, InboundMessage, MessageHandler, ResultPublisher};

use crate::config::ResultDelivery;
use crate::metrics;
use crate::processor::TaskProcessor;

pub struct TaskConsumer {
    parser: TaskParser,
    processor: Arc<TaskProcessor>,
    delivery: ResultDelivery,
}

impl TaskConsumer {
    pub fn new(parser: TaskParser, processor: Arc<TaskProcessor>, delivery: ResultDelivery) -> Self {
        Self {
            parser,
            processor,
            delivery,
        }
    }

    fn settle(&self, published: bool) -> Acknowledgement {
        match (self.delivery, published) {
            (ResultDelivery::AtLeastOnce, false) => Acknowledgement::Nack { requeue: true },
            _ => Acknowledgement::Ack,
        }
    }
}

#[async_trait]
impl MessageHandler for TaskConsumer {
    async fn handle(&self, message: &InboundMessage, publisher: &ResultPublisher) -> Acknowledgement {
        let tool = self.processor.tool_name().to_string();

        let payload = match TaskParser::decode(&message.body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(delivery_tag = message.delivery_tag, "Discarding message: {}", e);
                metrics::record_malformed(&tool);
                return Acknowledgement::REJECT;
            }
        };

        let task_id = self
            .parser
            .resolve_task_id(&payload, message.correlation_id.as_deref());

        let task = match self.parser.parse(&payload, task_id.clone()) {
            Ok(task) => task,
            Err(e) => {
                warn!(task_id = %task_id, "{}", e);
                metrics::record_task(&tool, "error", 0.0);
                let published = publisher
                    .publish(&task_id, &ProcessingResult::error(e.to_string()))
                    .await;
                return self.settle(published);
            }
        };

        let started = Instant::now();
        let processor = self.processor.clone();
        let outcome = tokio::spawn(async move { processor.process(&task).await }).await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(result) => {
                let status = if result.is_success() { "success" } else { "error" };
                metrics::record_task(&tool, status, elapsed);
                let published = publisher.publish(&task_id, &result).await;
                self.settle(published)
            }
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    join_error.to_string()
                };
                error!(task_id = %task_id, "Task processing failed unexpectedly: {}", reason);
                metrics::record_task(&tool, "critical_error", elapsed);
                publisher
                    .publish_critical(&task_id, format!("Unexpected failure: {}", reason))
                    .await;
                Acknowledgement::REJECT
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
