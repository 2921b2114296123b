//! Tool invocation with structured outcomes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use tonework_models::Task;

use crate::artifact::Located;
use crate::command::CommandRunner;
use crate::error::MediaError;
use crate::tools::AudioTool;
use crate::workspace::Workspace;

/// Result of invoking a tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Artifact produced at the given path.
    Success(PathBuf),
    /// Tool failed; `details` carries the diagnostics.
    Failure {
        message: String,
        details: Map<String, Value>,
    },
}

impl ToolOutcome {
    pub fn failure(message: impl Into<String>, details: Map<String, Value>) -> Self {
        Self::Failure {
            message: message.into(),
            details,
        }
    }
}

/// Runs one configured tool against a workspace.
#[derive(Clone)]
pub struct ToolRunner {
    tool: Arc<dyn AudioTool>,
    runner: CommandRunner,
}

impl ToolRunner {
    pub fn new(tool: Arc<dyn AudioTool>, runner: CommandRunner) -> Self {
        Self { tool, runner }
    }

    pub fn tool(&self) -> &dyn AudioTool {
        self.tool.as_ref()
    }

    /// Invoke the tool on `input` and locate its artifact.
    ///
    /// Never returns an error: every failure becomes `ToolOutcome::Failure`.
    pub async fn run(&self, task: &Task, input: &Path, workspace: &Workspace) -> ToolOutcome {
        let name = self.tool.name();

        if let Err(e) = self.tool.prepare(input, workspace).await {
            return ToolOutcome::failure(
                format!("Failed to prepare {}: {}", name, e),
                Map::new(),
            );
        }

        let cmd = self.tool.command(input, workspace, &task.params);
        info!(task_id = %task.task_id, tool = name, "Executing: {}", cmd.display());

        let output = match self.runner.run(&cmd).await {
            Ok(output) => output,
            Err(MediaError::Timeout(secs)) => {
                self.tool.on_timeout(input, workspace).await;
                let mut details = Map::new();
                details.insert("timeout_secs".into(), json!(secs));
                return ToolOutcome::failure(
                    format!("{} timed out after {} seconds", name, secs),
                    details,
                );
            }
            Err(e) => {
                return ToolOutcome::failure(format!("Failed to execute {}: {}", name, e), Map::new());
            }
        };

        debug!(task_id = %task.task_id, tool = name, "stdout:\n{}", output.stdout);
        if !output.stderr.trim().is_empty() {
            warn!(task_id = %task.task_id, tool = name, "stderr:\n{}", output.stderr);
        }

        if !output.success() {
            let mut details = Map::new();
            details.insert("exit_code".into(), json!(output.exit_code));
            details.insert("stdout".into(), Value::String(output.stdout));
            details.insert("stderr".into(), Value::String(output.stderr));
            return ToolOutcome::failure(format!("{} processing failed", name), details);
        }

        let locator = self.tool.locator(input, workspace);
        match locator.locate().await {
            Some(Located::Conventional(path)) => ToolOutcome::Success(path),
            Some(Located::Fallback(path)) => {
                warn!(
                    task_id = %task.task_id,
                    "Using fallback artifact {} instead of {}",
                    path.display(),
                    locator.expected.display()
                );
                ToolOutcome::Success(path)
            }
            None => {
                let mut details = Map::new();
                details.insert(
                    "expected_path".into(),
                    json!(locator.expected.to_string_lossy()),
                );
                details.insert(
                    "search_path".into(),
                    json!(locator.search_root.to_string_lossy()),
                );
                details.insert("stdout".into(), Value::String(output.stdout));
                details.insert("stderr".into(), Value::String(output.stderr));
                ToolOutcome::failure(
                    format!(
                        "{} output '{}' not found at {} or under {}",
                        name,
                        locator.marker,
                        locator.expected.display(),
                        locator.search_root.display()
                    ),
                    details,
                )
            }
        }
    }
}
