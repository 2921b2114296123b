//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const TASKS_TOTAL: &str = "tonework_tasks_total";
    pub const TASK_DURATION_SECONDS: &str = "tonework_task_duration_seconds";
    pub const MALFORMED_MESSAGES_TOTAL: &str = "tonework_malformed_messages_total";
}

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::startup_failed(format!("metrics exporter: {}", e)))
}

/// Record a finished task.
pub fn record_task(tool: &str, status: &str, duration_secs: f64) {
    let labels = [("tool", tool.to_string()), ("status", status.to_string())];
    counter!(names::TASKS_TOTAL, &labels).increment(1);
    histogram!(names::TASK_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_malformed(tool: &str) {
    let labels = [("tool", tool.to_string())];
    counter!(names::MALFORMED_MESSAGES_TOTAL, &labels).increment(1);
}
