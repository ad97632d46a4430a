//! Filesystem artifact store.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::info;

use super::{ArtifactError, ArtifactStore};

/// Writes artifacts as UTF-8 files, creating parent directories as needed.
#[derive(Debug, Clone, Default)]
pub struct FsArtifactStore;

impl FsArtifactStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write_text(&self, path: &Path, content: &str) -> Result<String, ArtifactError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|source| {
                ArtifactError::DirectoryCreationFailed {
                    path: parent.to_path_buf(),
                    source,
                }
            })?;
        }

        fs::write(path, content)
            .await
            .map_err(|source| ArtifactError::WriteFailed {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Wrote artifact: {}", path.display());
        Ok(path.display().to_string())
    }
}
