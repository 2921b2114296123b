//! In-memory collaborators for worker tests.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use tonework_media::{CommandRunner, DemucsConfig, DemucsTool, ToolRunner};
use tonework_queue::{Acknowledgement, DeliveryAcker, QueueError, QueueResult, ResultSink};
use tonework_storage::{BlobStore, StorageError, StorageResult};

use crate::processor::TaskProcessor;

/// Fake demucs: copies the input to `<out>/htdemucs/<stem>/vocals.wav`.
pub const FAKE_DEMUCS: &str = r#"#!/bin/sh
while [ $# -gt 1 ]; do
  case "$1" in
    --out) out="$2"; shift ;;
  esac
  shift
done
input="$1"
stem=$(basename "$input")
stem="${stem%.*}"
mkdir -p "$out/htdemucs/$stem"
cp "$input" "$out/htdemucs/$stem/vocals.wav"
echo "separated $stem"
"#;

/// Shared, ordered record of collaborator calls.
#[derive(Debug, Default)]
pub struct OpLog(Mutex<Vec<String>>);

impl OpLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct StoreState {
    objects: HashMap<(String, String), Vec<u8>>,
}

#[derive(Clone)]
pub struct MemoryBlobStore {
    state: Arc<Mutex<StoreState>>,
    log: Arc<OpLog>,
    fail_store: bool,
    panic_on_fetch: bool,
}

impl MemoryBlobStore {
    pub fn new(log: Arc<OpLog>) -> Self {
        Self {
            state: Arc::default(),
            log,
            fail_store: false,
            panic_on_fetch: false,
        }
    }

    pub fn with_object(self, bucket: &str, key: &str, data: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
        self
    }

    pub fn failing_store(mut self) -> Self {
        self.fail_store = true;
        self
    }

    pub fn panicking_fetch(mut self) -> Self {
        self.panic_on_fetch = true;
        self
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, bucket: &str, key: &str, dest: &Path) -> StorageResult<()> {
        self.log.push(format!("fetch {}/{}", bucket, key));
        if self.panic_on_fetch {
            panic!("fetch exploded");
        }
        let data = self
            .object(bucket, key)
            .ok_or_else(|| StorageError::not_found(format!("{}/{}", bucket, key)))?;
        tokio::fs::write(dest, data).await?;
        Ok(())
    }

    async fn store(&self, bucket: &str, key: &str, src: &Path, _content_type: &str) -> StorageResult<()> {
        self.log.push(format!("store {}/{}", bucket, key));
        if self.fail_store {
            return Err(StorageError::upload_failed("connection refused"));
        }
        let data = tokio::fs::read(src).await?;
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.log.push(format!("ensure_bucket {}", bucket));
        Ok(())
    }
}

/// Records published envelopes as JSON.
pub struct RecordingSink {
    log: Arc<OpLog>,
    published: Mutex<Vec<Value>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new(log: Arc<OpLog>) -> Self {
        Self {
            log,
            published: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing(log: Arc<OpLog>) -> Self {
        Self {
            fail: true,
            ..Self::new(log)
        }
    }

    pub fn published(&self) -> Vec<Value> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn publish(&self, _exchange: &str, _routing_key: &str, payload: &[u8], correlation_id: &str) -> QueueResult<()> {
        self.log.push(format!("publish {}", correlation_id));
        if self.fail {
            return Err(QueueError::publish_failed("channel closed"));
        }
        let json: Value = serde_json::from_slice(payload).map_err(|e| QueueError::publish_failed(e.to_string()))?;
        self.published.lock().unwrap().push(json);
        Ok(())
    }
}

pub struct RecordingAcker(pub Arc<OpLog>);

#[async_trait]
impl DeliveryAcker for RecordingAcker {
    async fn apply(&self, delivery_tag: u64, ack: Acknowledgement) -> QueueResult<()> {
        self.0.push(format!("ack {} {:?}", delivery_tag, ack));
        Ok(())
    }
}

/// Processor running the demucs adapter against `script` as its interpreter.
pub fn demucs_processor(store: MemoryBlobStore, script: &str) -> (TaskProcessor, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let script_path = dir.path().join("fake-demucs");
    std::fs::write(&script_path, script).unwrap();
    std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::fs::create_dir_all(dir.path().join("work")).unwrap();

    let tool = DemucsTool::new(DemucsConfig {
        python: script_path.to_string_lossy().to_string(),
        device: "cpu".to_string(),
        ..DemucsConfig::default()
    });
    let runner = ToolRunner::new(Arc::new(tool), CommandRunner::new().with_timeout(30));
    let processor = TaskProcessor::new(
        Arc::new(store),
        runner,
        "results",
        Some(dir.path().join("work")),
    );
    (processor, dir)
}
