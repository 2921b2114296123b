//! Source separation via demucs.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{env_or, input_stem, resolve_device, AudioTool};
use crate::artifact::ArtifactLocator;
use crate::command::ToolCommand;
use crate::workspace::Workspace;

/// Demucs settings.
#[derive(Debug, Clone)]
pub struct DemucsConfig {
    /// Python interpreter running `-m demucs`
    pub python: String,
    pub model: String,
    pub shifts: u32,
    /// `auto`, `cpu`, `cuda`, ...
    pub device: String,
    /// Stem isolated by `--two-stems`
    pub stem: String,
}

impl Default for DemucsConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            model: "htdemucs".to_string(),
            shifts: 0,
            device: "auto".to_string(),
            stem: "vocals".to_string(),
        }
    }
}

impl DemucsConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            python: env_or("DEMUCS_PYTHON", &defaults.python),
            model: env_or("DEMUCS_MODEL", &defaults.model),
            shifts: std::env::var("DEMUCS_SHIFTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.shifts),
            device: env_or("DEMUCS_DEVICE", &defaults.device),
            stem: env_or("DEMUCS_TWO_STEMS", &defaults.stem),
        }
    }
}

pub struct DemucsTool {
    config: DemucsConfig,
    device: String,
    marker: String,
    suffix: String,
}

impl DemucsTool {
    pub fn new(config: DemucsConfig) -> Self {
        let device = resolve_device(&config.device);
        let marker = format!("{}.wav", config.stem);
        Self {
            suffix: marker.clone(),
            marker,
            device,
            config,
        }
    }
}

#[async_trait]
impl AudioTool for DemucsTool {
    fn name(&self) -> &str {
        "demucs"
    }

    fn binary(&self) -> &str {
        &self.config.python
    }

    fn artifact_suffix(&self) -> &str {
        &self.suffix
    }

    fn content_type(&self) -> &str {
        "audio/wav"
    }

    fn success_message(&self) -> &str {
        "Vocals separated successfully"
    }

    fn command(&self, input: &Path, workspace: &Workspace, _params: &Map<String, Value>) -> ToolCommand {
        ToolCommand::new(&self.config.python)
            .args(["-m", "demucs"])
            .args(["-d", self.device.as_str()])
            .args(["-n", self.config.model.as_str()])
            .args(["--two-stems", self.config.stem.as_str()])
            .arg("--shifts")
            .arg(self.config.shifts.to_string())
            .arg("--out")
            .path_arg(workspace.output_dir())
            .path_arg(input)
    }

    fn locator(&self, input: &Path, workspace: &Workspace) -> ArtifactLocator {
        let expected = workspace
            .output_dir()
            .join(&self.config.model)
            .join(input_stem(input))
            .join(&self.marker);
        ArtifactLocator::new(expected, workspace.output_dir(), &self.marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> DemucsTool {
        DemucsTool::new(DemucsConfig {
            device: "cpu".to_string(),
            shifts: 2,
            ..DemucsConfig::default()
        })
    }

    #[test]
    fn test_command_line() {
        let ws = Workspace::create(None, "demucs-test-").unwrap();
        let input = ws.input_dir().join("t1.wav");
        let cmd = tool().command(&input, &ws, &Map::new());

        let out = ws.output_dir().to_string_lossy().to_string();
        let inp = input.to_string_lossy().to_string();
        assert_eq!(cmd.program(), "python3");
        assert_eq!(
            cmd.get_args(),
            &[
                "-m", "demucs", "-d", "cpu", "-n", "htdemucs", "--two-stems", "vocals",
                "--shifts", "2", "--out", out.as_str(), inp.as_str(),
            ]
        );
    }

    #[test]
    fn test_conventional_artifact_path() {
        let ws = Workspace::create(None, "demucs-test-").unwrap();
        let locator = tool().locator(&ws.input_dir().join("t1.mp3"), &ws);

        assert_eq!(
            locator.expected,
            ws.output_dir().join("htdemucs").join("t1").join("vocals.wav")
        );
        assert_eq!(locator.search_root, ws.output_dir());
        assert_eq!(locator.marker, "vocals.wav");
    }
}
