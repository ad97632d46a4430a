//! Artifact storage for downloaded payloads and raw API responses.
//!
//! Where an artifact goes is decided by [`ArtifactPaths`]; writing it is
//! delegated to an [`ArtifactStore`].

mod fs_store;
mod paths;

pub use fs_store::FsArtifactStore;
pub use paths::ArtifactPaths;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur writing an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Failed to create the parent directory.
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the artifact.
    #[error("Failed to write artifact: {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Storage backend rejected the write.
    #[error("Artifact store error: {0}")]
    Backend(String),
}

/// Destination for text artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write `content` at `path` and return the location to record for it.
    async fn write_text(&self, path: &Path, content: &str) -> Result<String, ArtifactError>;
}
