//! Result publishing.

use std::sync::Arc;

use tracing::{error, info};

use tonework_models::{ProcessingResult, ResultEnvelope, TaskId};

use crate::delivery::ResultSink;
use crate::metrics;

/// Fixed outbound destination and service tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub exchange: String,
    pub routing_key: String,
    /// Tool/service name carried by every envelope
    pub service: String,
}

/// Serializes results into envelopes and publishes them.
///
/// Publishing is best-effort: failures are logged and reported through
/// the return value, never raised.
#[derive(Clone)]
pub struct ResultPublisher {
    sink: Arc<dyn ResultSink>,
    target: PublishTarget,
}

impl ResultPublisher {
    pub fn new(sink: Arc<dyn ResultSink>, target: PublishTarget) -> Self {
        Self { sink, target }
    }

    /// Publish the result of a task. Returns whether the broker accepted it.
    pub async fn publish(&self, task_id: &TaskId, result: &ProcessingResult) -> bool {
        let envelope = ResultEnvelope::from_result(task_id.clone(), &self.target.service, result);
        self.send(&envelope).await
    }

    /// Publish a critical failure for a task.
    pub async fn publish_critical(&self, task_id: &TaskId, message: impl Into<String>) -> bool {
        let envelope = ResultEnvelope::critical(task_id.clone(), &self.target.service, message);
        self.send(&envelope).await
    }

    async fn send(&self, envelope: &ResultEnvelope) -> bool {
        let status = envelope.status.as_str();
        let payload = match envelope.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                error!(task_id = %envelope.task_id, "Failed to serialize result: {}", e);
                metrics::record_publish(status, false);
                return false;
            }
        };

        match self
            .sink
            .publish(
                &self.target.exchange,
                &self.target.routing_key,
                &payload,
                envelope.task_id.as_str(),
            )
            .await
        {
            Ok(()) => {
                info!(
                    task_id = %envelope.task_id,
                    status,
                    exchange = %self.target.exchange,
                    routing_key = %self.target.routing_key,
                    "Result published"
                );
                metrics::record_publish(status, true);
                true
            }
            Err(e) => {
                error!(task_id = %envelope.task_id, status, "Failed to publish result: {}", e);
                metrics::record_publish(status, false);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QueueError, QueueResult};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        fail: bool,
        sent: Mutex<Vec<(String, String, Vec<u8>, String)>>,
    }

    #[async_trait]
    impl ResultSink for Recorder {
        async fn publish(
            &self,
            exchange: &str,
            routing_key: &str,
            payload: &[u8],
            correlation_id: &str,
        ) -> QueueResult<()> {
            if self.fail {
                return Err(QueueError::publish_failed("channel closed"));
            }
            self.sent.lock().unwrap().push((
                exchange.to_string(),
                routing_key.to_string(),
                payload.to_vec(),
                correlation_id.to_string(),
            ));
            Ok(())
        }
    }

    fn target() -> PublishTarget {
        PublishTarget {
            exchange: "results_exchange".into(),
            routing_key: "task.result.demucs".into(),
            service: "demucs".into(),
        }
    }

    #[tokio::test]
    async fn test_publish_sets_destination_and_correlation() {
        let sink = Arc::new(Recorder::default());
        let publisher = ResultPublisher::new(sink.clone(), target());
        let id = TaskId::from_string("t1");

        assert!(publisher.publish(&id, &ProcessingResult::error("boom")).await);

        let sent = sink.sent.lock().unwrap();
        let (exchange, rk, payload, correlation) = &sent[0];
        assert_eq!(exchange, "results_exchange");
        assert_eq!(rk, "task.result.demucs");
        assert_eq!(correlation, "t1");

        let json: Value = serde_json::from_slice(payload).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["service"], "demucs");
        assert_eq!(json["error_message"], "boom");
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let sink = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let publisher = ResultPublisher::new(sink, target());
        assert!(!publisher.publish_critical(&TaskId::from_string("t2"), "panic").await);
    }
}
