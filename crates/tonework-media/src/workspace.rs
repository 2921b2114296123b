//! Scratch workspace owned by a single task.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::MediaResult;

/// Ephemeral directory tree with `input/` and `output/` subdirectories.
///
/// The tree is removed when the value is dropped, on every exit path.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl Workspace {
    /// Create a workspace under `parent`, or the system temp dir.
    pub fn create(parent: Option<&Path>, prefix: &str) -> MediaResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };

        let input = dir.path().join("input");
        let output = dir.path().join("output");
        std::fs::create_dir_all(&input)?;
        std::fs::create_dir_all(&output)?;

        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir, input, output })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_dir(&self) -> &Path {
        &self.input
    }

    pub fn output_dir(&self) -> &Path {
        &self.output
    }
}
