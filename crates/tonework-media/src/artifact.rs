//! Artifact lookup after a tool run.
//!
//! Tools write their result to a conventional path that depends on the
//! input name and tool settings. When that path is absent after a clean
//! exit, a bounded breadth-first search under one root looks for the
//! marker file. Within a directory an exact (case-insensitive) file name
//! match beats a name that merely contains the marker, so `vocals.wav` is
//! preferred over `no_vocals.wav`. The shallowest directory wins; ties
//! break on lexicographic path order so the result does not depend on
//! directory iteration order.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Default depth limit for the fallback search.
pub const DEFAULT_SEARCH_DEPTH: usize = 4;

/// Where the artifact was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// At the conventional path.
    Conventional(PathBuf),
    /// Through the fallback search.
    Fallback(PathBuf),
}

/// Conventional path plus fallback search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    pub expected: PathBuf,
    pub search_root: PathBuf,
    pub marker: String,
    pub max_depth: usize,
}

impl ArtifactLocator {
    pub fn new(
        expected: impl Into<PathBuf>,
        search_root: impl Into<PathBuf>,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            expected: expected.into(),
            search_root: search_root.into(),
            marker: marker.into(),
            max_depth: DEFAULT_SEARCH_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Find the artifact, or `None` when neither lookup matches.
    pub async fn locate(&self) -> Option<Located> {
        if is_file(&self.expected).await {
            return Some(Located::Conventional(self.expected.clone()));
        }

        info!(
            "Expected artifact {} missing, searching {} for '{}'",
            self.expected.display(),
            self.search_root.display(),
            self.marker
        );

        let found = self.search().await;
        match &found {
            Some(path) => info!("Fallback search found {}", path.display()),
            None => debug!("Fallback search found nothing"),
        }
        found.map(Located::Fallback)
    }

    async fn search(&self) -> Option<PathBuf> {
        let marker = self.marker.to_lowercase();
        let mut queue = VecDeque::from([(self.search_root.clone(), 0usize)]);

        while let Some((dir, depth)) = queue.pop_front() {
            let (files, subdirs) = match list_dir(&dir).await {
                Ok(listing) => listing,
                Err(e) => {
                    debug!("Skipping {}: {}", dir.display(), e);
                    continue;
                }
            };

            let exact = files.iter().find(|p| match_kind(p, &marker) == Some(MatchKind::Exact));
            let partial = || files.iter().find(|p| match_kind(p, &marker).is_some());
            if let Some(path) = exact.or_else(partial) {
                return Some(path.clone());
            }

            if depth + 1 < self.max_depth {
                queue.extend(subdirs.into_iter().map(|d| (d, depth + 1)));
            }
        }

        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchKind {
    Exact,
    Contains,
}

fn match_kind(path: &Path, marker: &str) -> Option<MatchKind> {
    let name = path.file_name()?.to_str()?.to_lowercase();
    if name == marker {
        Some(MatchKind::Exact)
    } else if name.contains(marker) {
        Some(MatchKind::Contains)
    } else {
        None
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Sorted files and subdirectories of `dir`.
async fn list_dir(dir: &Path) -> std::io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        if metadata.is_dir() {
            subdirs.push(path);
        } else if metadata.is_file() {
            files.push(path);
        }
    }

    files.sort();
    subdirs.sort();
    Ok((files, subdirs))
}
