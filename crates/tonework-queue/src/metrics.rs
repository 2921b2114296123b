//! Broker-side metrics.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const RECONNECTS_TOTAL: &str = "tonework_broker_reconnects_total";
    pub const ACKS_TOTAL: &str = "tonework_messages_acked_total";
    pub const NACKS_TOTAL: &str = "tonework_messages_nacked_total";
    pub const RESULTS_PUBLISHED_TOTAL: &str = "tonework_results_published_total";
    pub const RESULTS_FAILED_TOTAL: &str = "tonework_results_publish_failed_total";
}

pub fn record_reconnect() {
    counter!(names::RECONNECTS_TOTAL).increment(1);
}

pub fn record_ack() {
    counter!(names::ACKS_TOTAL).increment(1);
}

pub fn record_nack(requeue: bool) {
    let labels = [("requeue", requeue.to_string())];
    counter!(names::NACKS_TOTAL, &labels).increment(1);
}

pub fn record_publish(status: &str, ok: bool) {
    let labels = [("status", status.to_string())];
    if ok {
        counter!(names::RESULTS_PUBLISHED_TOTAL, &labels).increment(1);
    } else {
        counter!(names::RESULTS_FAILED_TOTAL, &labels).increment(1);
    }
}
