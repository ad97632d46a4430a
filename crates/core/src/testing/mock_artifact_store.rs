//! Mock artifact store for testing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::artifact::{ArtifactError, ArtifactStore};

/// A recorded artifact write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub path: PathBuf,
    pub content: String,
}

/// In-memory implementation of the ArtifactStore trait.
///
/// Records every write and returns the path as the location.
#[derive(Debug, Clone, Default)]
pub struct MockArtifactStore {
    writes: Arc<RwLock<Vec<RecordedWrite>>>,
    /// Writes whose path contains this fragment fail.
    fail_matching: Arc<RwLock<Option<String>>>,
}

impl MockArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded writes.
    pub async fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.read().await.clone()
    }

    /// Fail every write whose path contains `fragment`.
    pub async fn fail_writes_matching(&self, fragment: impl Into<String>) {
        *self.fail_matching.write().await = Some(fragment.into());
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    async fn write_text(&self, path: &Path, content: &str) -> Result<String, ArtifactError> {
        let fail = self.fail_matching.read().await.clone();
        if let Some(fragment) = fail {
            if path.to_string_lossy().contains(&fragment) {
                return Err(ArtifactError::Backend(format!(
                    "mock write failure: {}",
                    path.display()
                )));
            }
        }

        self.writes.write().await.push(RecordedWrite {
            path: path.to_path_buf(),
            content: content.to_string(),
        });
        Ok(path.display().to_string())
    }
}
