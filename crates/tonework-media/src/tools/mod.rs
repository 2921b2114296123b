//! Adapters for the supported external audio tools.
//!
//! Each adapter knows how to build the command line for its tool, where
//! the tool conventionally writes its artifact, and how to name and
//! describe the uploaded result. Everything else (spawning, timeouts,
//! artifact search, diagnostics) lives in [`crate::runner`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::artifact::ArtifactLocator;
use crate::command::ToolCommand;
use crate::error::{MediaError, MediaResult};
use crate::workspace::Workspace;

mod demucs;
mod denoise;
mod whisper;

pub use demucs::{DemucsConfig, DemucsTool};
pub use denoise::{DenoiseConfig, HistoricalDenoiseTool};
pub use whisper::{WhisperConfig, WhisperTool};

/// An external tool invoked as an opaque subprocess.
#[async_trait]
pub trait AudioTool: Send + Sync {
    /// Tool name, used in output keys and as the service tag.
    fn name(&self) -> &str;

    /// Executable that must be on `PATH`.
    fn binary(&self) -> &str;

    /// Suffix appended to uploaded artifact names.
    fn artifact_suffix(&self) -> &str;

    /// Content type of the uploaded artifact.
    fn content_type(&self) -> &str;

    /// Message carried by a success result.
    fn success_message(&self) -> &str;

    /// Work to do before the command runs.
    async fn prepare(&self, _input: &Path, _workspace: &Workspace) -> MediaResult<()> {
        Ok(())
    }

    /// Build the invocation for `input`.
    fn command(&self, input: &Path, workspace: &Workspace, params: &Map<String, Value>) -> ToolCommand;

    /// Called after the command was killed for exceeding the timeout.
    ///
    /// Tools that start work outside their own process tree release it here.
    async fn on_timeout(&self, _input: &Path, _workspace: &Workspace) {}

    /// Conventional artifact location and fallback search for `input`.
    fn locator(&self, input: &Path, workspace: &Workspace) -> ArtifactLocator;

    /// Extra fields for the success result, read from the artifact.
    async fn result_fields(
        &self,
        _artifact: &Path,
        _params: &Map<String, Value>,
    ) -> MediaResult<Map<String, Value>> {
        Ok(Map::new())
    }
}

/// Supported tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Demucs,
    Whisper,
    HistoricalDenoise,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Demucs => "demucs",
            ToolKind::Whisper => "whisper",
            ToolKind::HistoricalDenoise => "historical_denoise",
        }
    }

    /// Build the adapter configured from environment variables.
    pub fn build_from_env(&self) -> Arc<dyn AudioTool> {
        match self {
            ToolKind::Demucs => Arc::new(DemucsTool::new(DemucsConfig::from_env())),
            ToolKind::Whisper => Arc::new(WhisperTool::new(WhisperConfig::from_env())),
            ToolKind::HistoricalDenoise => {
                Arc::new(HistoricalDenoiseTool::new(DenoiseConfig::from_env()))
            }
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "demucs" => Ok(ToolKind::Demucs),
            "whisper" => Ok(ToolKind::Whisper),
            "historical_denoise" | "denoise" => Ok(ToolKind::HistoricalDenoise),
            other => Err(MediaError::UnknownTool(other.to_string())),
        }
    }
}

/// Resolve a device setting; `auto` picks `cuda` when `nvidia-smi` is present.
pub fn resolve_device(requested: &str) -> String {
    let requested = requested.trim();
    if requested.is_empty() || requested.eq_ignore_ascii_case("auto") {
        if which::which("nvidia-smi").is_ok() {
            "cuda".to_string()
        } else {
            "cpu".to_string()
        }
    } else {
        requested.to_string()
    }
}

/// File stem of `input` as a string, empty when not representable.
pub(crate) fn input_stem(input: &Path) -> String {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_kind_parse() {
        assert_eq!("demucs".parse::<ToolKind>().unwrap(), ToolKind::Demucs);
        assert_eq!("Whisper".parse::<ToolKind>().unwrap(), ToolKind::Whisper);
        assert_eq!(
            "historical-denoise".parse::<ToolKind>().unwrap(),
            ToolKind::HistoricalDenoise
        );
        assert!("ffmpeg".parse::<ToolKind>().is_err());
        assert_eq!(ToolKind::HistoricalDenoise.to_string(), "historical_denoise");
    }

    #[test]
    fn test_explicit_device_passes_through() {
        assert_eq!(resolve_device("cuda:1"), "cuda:1");
        let auto = resolve_device("auto");
        assert!(auto == "cuda" || auto == "cpu");
    }
}
