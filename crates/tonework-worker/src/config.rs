//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tonework_media::ToolKind;

use crate::error::{WorkerError, WorkerResult};

/// What happens to a message whose result could not be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultDelivery {
    /// Ack regardless; the result may be lost.
    #[default]
    AtMostOnce,
    /// Nack with requeue so the task is processed again.
    AtLeastOnce,
}

impl FromStr for ResultDelivery {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "at_most_once" => Ok(ResultDelivery::AtMostOnce),
            "at_least_once" => Ok(ResultDelivery::AtLeastOnce),
            other => Err(WorkerError::config_error(format!(
                "WORKER_RESULT_DELIVERY must be at_most_once or at_least_once, got '{}'",
                other
            ))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Tool this worker runs
    pub tool: ToolKind,
    /// Prefix of uploaded artifact keys
    pub results_prefix: String,
    /// Parent of per-task scratch workspaces; system temp dir when unset
    pub work_dir: Option<PathBuf>,
    /// Tool timeout in seconds, 0 disables
    pub tool_timeout_secs: u64,
    pub result_delivery: ResultDelivery,
    /// Prometheus listener address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tool: ToolKind::Demucs,
            results_prefix: "results".to_string(),
            work_dir: None,
            tool_timeout_secs: 7200, // 2 hours
            result_delivery: ResultDelivery::AtMostOnce,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        Ok(Self {
            tool: match non_empty("WORKER_TOOL") {
                Some(v) => v.parse()?,
                None => defaults.tool,
            },
            results_prefix: non_empty("WORKER_RESULTS_PREFIX")
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or(defaults.results_prefix),
            work_dir: non_empty("WORKER_WORK_DIR").map(PathBuf::from),
            tool_timeout_secs: match non_empty("WORKER_TOOL_TIMEOUT_SECS") {
                Some(v) => v.parse().map_err(|_| {
                    WorkerError::config_error(format!("WORKER_TOOL_TIMEOUT_SECS is not a number: '{}'", v))
                })?,
                None => defaults.tool_timeout_secs,
            },
            result_delivery: match non_empty("WORKER_RESULT_DELIVERY") {
                Some(v) => v.parse()?,
                None => defaults.result_delivery,
            },
            metrics_addr: match non_empty("METRICS_ADDR") {
                Some(v) => Some(v.parse().map_err(|_| {
                    WorkerError::config_error(format!("METRICS_ADDR is not a socket address: '{}'", v))
                })?),
                None => None,
            },
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
