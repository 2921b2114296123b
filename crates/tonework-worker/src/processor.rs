//! End-to-end processing of one task.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::Instrument;

use tonework_media::{ToolOutcome, ToolRunner, Workspace};
use tonework_models::{ProcessingResult, Task};
use tonework_storage::BlobStore;

use crate::logging::TaskLogger;

/// Fetches the input, runs the tool and stores the artifact.
pub struct TaskProcessor {
    store: Arc<dyn BlobStore>,
    runner: ToolRunner,
    results_prefix: String,
    work_dir: Option<PathBuf>,
}

impl TaskProcessor {
    pub fn new(
        store: Arc<dyn BlobStore>,
        runner: ToolRunner,
        results_prefix: impl Into<String>,
        work_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            runner,
            results_prefix: results_prefix.into(),
            work_dir,
        }
    }

    pub fn tool_name(&self) -> &str {
        self.runner.tool().name()
    }

    /// Key under which the artifact of `task` is stored.
    pub fn output_key(&self, task: &Task) -> String {
        let tool = self.runner.tool();
        format!(
            "{}/{}/{}_{}_{}",
            self.results_prefix,
            tool.name(),
            task.task_id,
            task.output_basename,
            tool.artifact_suffix()
        )
    }

    /// Process `task`. Never fails: every failure becomes an error result.
    ///
    /// The scratch workspace is dropped, and removed, on every return path.
    pub async fn process(&self, task: &Task) -> ProcessingResult {
        let logger = TaskLogger::new(&task.task_id, self.tool_name());
        let span = logger.create_span();
        self.process_inner(task, &logger).instrument(span).await
    }

    async fn process_inner(&self, task: &Task, logger: &TaskLogger) -> ProcessingResult {
        let tool = self.runner.tool();
        logger.log_start(&format!("{}/{}", task.input_bucket, task.input_object));

        let workspace = match Workspace::create(self.work_dir.as_deref(), &format!("{}-", tool.name())) {
            Ok(ws) => ws,
            Err(e) => {
                logger.log_error(&format!("workspace: {}", e));
                return ProcessingResult::error(format!("Failed to create scratch workspace: {}", e));
            }
        };

        let input = workspace.input_dir().join(task.local_input_name());
        if let Err(e) = self
            .store
            .fetch(&task.input_bucket, &task.input_object, &input)
            .await
        {
            logger.log_error(&format!("download: {}", e));
            let mut details = Map::new();
            details.insert("bucket".into(), json!(task.input_bucket));
            details.insert("object".into(), json!(task.input_object));
            return ProcessingResult::error_with_details(
                format!("Failed to download input file: {}", e),
                details,
            );
        }
        logger.log_progress("input downloaded");

        let artifact = match self.runner.run(task, &input, &workspace).await {
            ToolOutcome::Success(path) => path,
            ToolOutcome::Failure { message, details } => {
                logger.log_error(&message);
                return ProcessingResult::error_with_details(message, details);
            }
        };
        logger.log_progress(&format!("artifact at {}", artifact.display()));

        let extra = match tool.result_fields(&artifact, &task.params).await {
            Ok(fields) => fields,
            Err(e) => {
                logger.log_error(&format!("result fields: {}", e));
                let mut details = Map::new();
                details.insert("artifact".into(), json!(artifact.to_string_lossy()));
                return ProcessingResult::error_with_details(
                    format!("Failed to read {} output: {}", tool.name(), e),
                    details,
                );
            }
        };

        let output_key = self.output_key(task);
        if let Err(e) = self
            .store
            .store(&task.input_bucket, &output_key, &artifact, tool.content_type())
            .await
        {
            logger.log_error(&format!("upload: {}", e));
            let mut details: Map<String, Value> = Map::new();
            details.insert("bucket".into(), json!(task.input_bucket));
            details.insert("object".into(), json!(output_key));
            return ProcessingResult::error_with_details(
                format!("Failed to upload result: {}", e),
                details,
            );
        }

        logger.log_completion(&format!("{}/{}", task.input_bucket, output_key));
        ProcessingResult::success(&task.input_bucket, output_key, tool.success_message())
            .with_extra(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{demucs_processor, MemoryBlobStore, OpLog, FAKE_DEMUCS};
    use tonework_models::TaskId;

    fn task(object: &str) -> Task {
        Task {
            task_id: TaskId::from_string("t-1"),
            input_bucket: "audio-bucket".into(),
            input_object: object.into(),
            output_basename: "song".into(),
            params: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_success_stores_under_results_prefix() {
        let log = OpLog::new();
        let store = MemoryBlobStore::new(log.clone()).with_object("audio-bucket", "song.wav", b"pcm");
        let (processor, _dir) = demucs_processor(store.clone(), FAKE_DEMUCS);

        let result = processor.process(&task("song.wav")).await;

        match result {
            ProcessingResult::Success { output_bucket, output_object, .. } => {
                assert_eq!(output_bucket, "audio-bucket");
                assert_eq!(output_object, "results/demucs/t-1_song_vocals.wav");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(
            store.object("audio-bucket", "results/demucs/t-1_song_vocals.wav"),
            Some(b"pcm".to_vec())
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_names_object() {
        let log = OpLog::new();
        let store = MemoryBlobStore::new(log);
        let (processor, _dir) = demucs_processor(store, FAKE_DEMUCS);

        match processor.process(&task("missing.wav")).await {
            ProcessingResult::Error { details, .. } => {
                assert_eq!(details["bucket"], json!("audio-bucket"));
                assert_eq!(details["object"], json!("missing.wav"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tool_failure_keeps_diagnostics() {
        let log = OpLog::new();
        let store = MemoryBlobStore::new(log).with_object("audio-bucket", "song.wav", b"pcm");
        let (processor, _dir) =
            demucs_processor(store, "#!/bin/sh\necho loading model\necho 'CUDA out of memory' >&2\nexit 2\n");

        match processor.process(&task("song.wav")).await {
            ProcessingResult::Error { details, .. } => {
                assert_eq!(details["exit_code"], json!(2));
                assert_eq!(details["stdout"], json!("loading model\n"));
                assert_eq!(details["stderr"], json!("CUDA out of memory\n"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_error_result() {
        let log = OpLog::new();
        let store = MemoryBlobStore::new(log)
            .with_object("audio-bucket", "song.wav", b"pcm")
            .failing_store();
        let (processor, _dir) = demucs_processor(store, FAKE_DEMUCS);

        match processor.process(&task("song.wav")).await {
            ProcessingResult::Error { message, details } => {
                assert!(message.contains("upload"));
                assert_eq!(details["object"], json!("results/demucs/t-1_song_vocals.wav"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_workspace_removed_after_task() {
        let log = OpLog::new();
        let store = MemoryBlobStore::new(log).with_object("audio-bucket", "song.wav", b"pcm");
        let (processor, dir) = demucs_processor(store, FAKE_DEMUCS);

        processor.process(&task("song.wav")).await;

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("work")).unwrap().collect();
        assert!(leftovers.is_empty());
    }
}
