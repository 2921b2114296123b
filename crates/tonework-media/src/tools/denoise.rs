//! Historical recording restoration via a containerized denoiser.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{env_or, input_stem, AudioTool};
use crate::artifact::ArtifactLocator;
use crate::command::{CommandRunner, ToolCommand};
use crate::error::MediaResult;
use crate::workspace::Workspace;

/// Denoiser container settings.
#[derive(Debug, Clone)]
pub struct DenoiseConfig {
    pub docker: String,
    pub image: String,
    /// Inference entrypoint inside the container
    pub script: String,
    /// Mount point of the workspace inside the container
    pub mount: String,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            image: "historical-denoiser:latest".to_string(),
            script: "/app/inference.py".to_string(),
            mount: "/app/data".to_string(),
        }
    }
}

impl DenoiseConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            docker: env_or("DENOISE_DOCKER", &defaults.docker),
            image: env_or("DENOISE_IMAGE", &defaults.image),
            script: env_or("DENOISE_SCRIPT", &defaults.script),
            mount: env_or("DENOISE_MOUNT", &defaults.mount),
        }
    }
}

pub struct HistoricalDenoiseTool {
    config: DenoiseConfig,
}

/// Upper bound for removing a stuck container.
const REMOVE_TIMEOUT_SECS: u64 = 60;

impl HistoricalDenoiseTool {
    pub fn new(config: DenoiseConfig) -> Self {
        Self { config }
    }

    /// Container name for one input; the input stem is the sanitized task id.
    fn container_name(input: &Path) -> String {
        format!("tonework-{}", input_stem(input))
    }
}

#[async_trait]
impl AudioTool for HistoricalDenoiseTool {
    fn name(&self) -> &str {
        "historical_denoise"
    }

    fn binary(&self) -> &str {
        &self.config.docker
    }

    fn artifact_suffix(&self) -> &str {
        "denoised.wav"
    }

    fn content_type(&self) -> &str {
        "audio/wav"
    }

    fn success_message(&self) -> &str {
        "Audio denoised successfully"
    }

    /// The container only sees the workspace, so the input must sit in `input/`.
    async fn prepare(&self, input: &Path, workspace: &Workspace) -> MediaResult<()> {
        if input.parent() == Some(workspace.input_dir()) {
            return Ok(());
        }
        if let Some(name) = input.file_name() {
            let dest = workspace.input_dir().join(name);
            debug!("Copying {} into {}", input.display(), dest.display());
            tokio::fs::copy(input, dest).await?;
        }
        Ok(())
    }

    fn command(&self, input: &Path, workspace: &Workspace, _params: &Map<String, Value>) -> ToolCommand {
        let volume = format!("{}:{}", workspace.root().display(), self.config.mount);
        ToolCommand::new(&self.config.docker)
            .args(["run", "--rm", "--name"])
            .arg(Self::container_name(input))
            .arg("-v")
            .arg(volume)
            .arg(&self.config.image)
            .arg("python")
            .arg(&self.config.script)
    }

    /// Killing `docker run` leaves the container running; remove it explicitly.
    async fn on_timeout(&self, input: &Path, _workspace: &Workspace) {
        let name = Self::container_name(input);
        let cmd = ToolCommand::new(&self.config.docker).args(["rm", "-f", name.as_str()]);

        match CommandRunner::new().with_timeout(REMOVE_TIMEOUT_SECS).run(&cmd).await {
            Ok(output) if output.success() => info!(container = %name, "Removed timed out container"),
            Ok(output) => warn!(
                container = %name,
                exit_code = ?output.exit_code,
                "Failed to remove container: {}",
                output.stderr.trim()
            ),
            Err(e) => warn!(container = %name, "Failed to remove container: {}", e),
        }
    }

    fn locator(&self, input: &Path, workspace: &Workspace) -> ArtifactLocator {
        let root = workspace.output_dir().join(input_stem(input));
        ArtifactLocator::new(root.join("denoised.wav"), root, "denoised.wav")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ToolOutcome, ToolRunner};
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tonework_models::{Task, TaskId};

    #[test]
    fn test_command_mounts_workspace() {
        let ws = Workspace::create(None, "denoise-test-").unwrap();
        let tool = HistoricalDenoiseTool::new(DenoiseConfig::default());
        let cmd = tool.command(&ws.input_dir().join("t1.wav"), &ws, &Map::new());

        let volume = format!("{}:/app/data", ws.root().display());
        assert_eq!(cmd.program(), "docker");
        assert_eq!(
            cmd.get_args(),
            &[
                "run", "--rm", "--name", "tonework-t1", "-v", volume.as_str(),
                "historical-denoiser:latest",
                "python", "/app/inference.py",
            ]
        );
    }

    #[test]
    fn test_search_root_is_per_input() {
        let ws = Workspace::create(None, "denoise-test-").unwrap();
        let tool = HistoricalDenoiseTool::new(DenoiseConfig::default());
        let locator = tool.locator(&ws.input_dir().join("t1.flac"), &ws);

        assert_eq!(locator.search_root, ws.output_dir().join("t1"));
        assert_eq!(locator.expected, ws.output_dir().join("t1").join("denoised.wav"));
    }

    #[tokio::test]
    async fn test_prepare_copies_outside_input() {
        let ws = Workspace::create(None, "denoise-test-").unwrap();
        let other = tempfile::tempdir().unwrap();
        let src = other.path().join("t1.wav");
        std::fs::write(&src, b"pcm").unwrap();

        let tool = HistoricalDenoiseTool::new(DenoiseConfig::default());
        tool.prepare(&src, &ws).await.unwrap();
        assert!(ws.input_dir().join("t1.wav").is_file());
    }

    #[tokio::test]
    async fn test_timeout_removes_container() {
        let dir = tempfile::tempdir().unwrap();
        let calls = dir.path().join("calls.log");
        let docker = dir.path().join("docker");
        let script = format!(
            "#!/bin/sh\necho \"$*\" >> {}\nif [ \"$1\" = run ]; then exec sleep 5; fi\n",
            calls.display()
        );
        std::fs::write(&docker, script).unwrap();
        std::fs::set_permissions(&docker, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tool = HistoricalDenoiseTool::new(DenoiseConfig {
            docker: docker.to_string_lossy().to_string(),
            ..DenoiseConfig::default()
        });
        let runner = ToolRunner::new(Arc::new(tool), CommandRunner::new().with_timeout(1));
        let ws = Workspace::create(None, "denoise-test-").unwrap();
        let task = Task {
            task_id: TaskId::from_string("t1"),
            input_bucket: "b".into(),
            input_object: "old.wav".into(),
            output_basename: "old".into(),
            params: Map::new(),
        };

        let outcome = runner.run(&task, &ws.input_dir().join("t1.wav"), &ws).await;
        assert!(matches!(outcome, ToolOutcome::Failure { .. }));

        let log = std::fs::read_to_string(&calls).unwrap();
        assert!(log.lines().any(|l| l.starts_with("run --rm --name tonework-t1")));
        assert!(log.lines().any(|l| l == "rm -f tonework-t1"));
    }
}
