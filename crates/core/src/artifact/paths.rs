use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::config::ArtifactConfig;
use crate::job::JobRecord;

/// Builds artifact paths from a job's name and as-of date.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    data_dir: PathBuf,
    response_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(data_dir: impl Into<PathBuf>, response_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            response_dir: response_dir.into(),
        }
    }

    /// Downloaded result: `{data_dir}/{name}_{as_of}.json`.
    ///
    /// Re-downloading the same job type and date overwrites the earlier file.
    pub fn data_path(&self, job: &JobRecord) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}.json", file_stem(&job.name), job.as_of))
    }

    /// Raw API response: `{response_dir}/{name}_{as_of}_{kind}Response_{timestamp}.txt`.
    pub fn response_path(&self, job: &JobRecord, kind: &str, at: DateTime<Utc>) -> PathBuf {
        self.response_dir.join(format!(
            "{}_{}_{}Response_{}.txt",
            file_stem(&job.name),
            job.as_of,
            kind,
            at.format("%Y%m%d-%H%M%S%6f")
        ))
    }
}

impl From<&ArtifactConfig> for ArtifactPaths {
    fn from(config: &ArtifactConfig) -> Self {
        Self::new(&config.data_dir, &config.response_dir)
    }
}

/// Job names are labels, not paths.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
