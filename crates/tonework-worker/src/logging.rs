//! Structured task logging utilities.

use tracing::{error, info, Span};
use tonework_models::TaskId;

/// Task logger for consistent lifecycle lines.
///
/// Every line carries the task id and tool name as structured fields.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    tool: String,
}

impl TaskLogger {
    pub fn new(task_id: &TaskId, tool: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            tool: tool.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(task_id = %self.task_id, tool = %self.tool, "Task started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(task_id = %self.task_id, tool = %self.tool, "Task progress: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(task_id = %self.task_id, tool = %self.tool, "Task error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(task_id = %self.task_id, tool = %self.tool, "Task completed: {}", message);
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Span covering the whole task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("task", task_id = %self.task_id, tool = %self.tool)
    }
}
