//! Speech-to-text via the whisper CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{env_or, input_stem, resolve_device, AudioTool};
use crate::artifact::ArtifactLocator;
use crate::command::ToolCommand;
use crate::error::MediaResult;
use crate::workspace::Workspace;

/// Whisper settings.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub binary: String,
    pub model: String,
    /// Default language, overridable per task with a `language` field
    pub language: String,
    /// Model download directory, shared across tasks
    pub cache_dir: PathBuf,
    pub device: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            binary: "whisper".to_string(),
            model: "medium".to_string(),
            language: "ru".to_string(),
            cache_dir: PathBuf::from("/app/whisper_cache"),
            device: "auto".to_string(),
        }
    }
}

impl WhisperConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            binary: env_or("WHISPER_BINARY", &defaults.binary),
            model: env_or("WHISPER_MODEL_NAME", &defaults.model),
            language: env_or("WHISPER_LANGUAGE", &defaults.language),
            cache_dir: std::env::var("WHISPER_CACHE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            device: env_or("WHISPER_DEVICE", &defaults.device),
        }
    }
}

pub struct WhisperTool {
    config: WhisperConfig,
    device: String,
}

impl WhisperTool {
    pub fn new(config: WhisperConfig) -> Self {
        Self {
            device: resolve_device(&config.device),
            config,
        }
    }

    fn language<'a>(&'a self, params: &'a Map<String, Value>) -> &'a str {
        params
            .get("language")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.config.language)
    }
}

/// Subset of the whisper JSON transcript we report back.
#[derive(Debug, Deserialize)]
struct Transcript {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl AudioTool for WhisperTool {
    fn name(&self) -> &str {
        "whisper"
    }

    fn binary(&self) -> &str {
        &self.config.binary
    }

    fn artifact_suffix(&self) -> &str {
        "transcription.json"
    }

    fn content_type(&self) -> &str {
        "application/json"
    }

    fn success_message(&self) -> &str {
        "Transcription completed successfully"
    }

    async fn prepare(&self, _input: &Path, _workspace: &Workspace) -> MediaResult<()> {
        tokio::fs::create_dir_all(&self.config.cache_dir).await?;
        Ok(())
    }

    fn command(&self, input: &Path, workspace: &Workspace, params: &Map<String, Value>) -> ToolCommand {
        ToolCommand::new(&self.config.binary)
            .path_arg(input)
            .args(["--model", self.config.model.as_str()])
            .args(["--language", self.language(params)])
            .args(["--output_format", "json"])
            .arg("--output_dir")
            .path_arg(workspace.output_dir())
            .arg("--model_dir")
            .path_arg(&self.config.cache_dir)
            .args(["--device", self.device.as_str()])
            .args(["--fp16", "False"])
    }

    fn locator(&self, input: &Path, workspace: &Workspace) -> ArtifactLocator {
        let expected = workspace
            .output_dir()
            .join(format!("{}.json", input_stem(input)));
        ArtifactLocator::new(expected, workspace.output_dir(), ".json")
    }

    async fn result_fields(
        &self,
        artifact: &Path,
        params: &Map<String, Value>,
    ) -> MediaResult<Map<String, Value>> {
        let raw = tokio::fs::read(artifact).await?;
        let transcript: Transcript = serde_json::from_slice(&raw)?;
        debug!("Transcript has {} segments", transcript.segments.len());

        let segments: Vec<Value> = transcript
            .segments
            .iter()
            .map(|s| json!({"start": s.start, "end": s.end, "text": s.text}))
            .collect();

        let mut fields = Map::new();
        fields.insert("full_text".into(), Value::String(transcript.text));
        fields.insert("segments".into(), Value::Array(segments));
        fields.insert("language_requested".into(), json!(self.language(params)));
        fields.insert(
            "language_detected_by_model".into(),
            transcript.language.map(Value::String).unwrap_or(Value::Null),
        );
        fields.insert("model_used".into(), json!(self.config.model));
        Ok(fields)
    }
}
