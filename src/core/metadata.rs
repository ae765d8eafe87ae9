use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{DepotError, Result};
use super::types::{FileMetadata, TaskId};

/// Persisted record of one backup job, one JSON document per job.
///
/// Written by the external coordinator; this crate only reads it back
/// during expiry sweeps. Every name in `files` referred to a real file
/// under the namespace at the time of writing, though files may
/// legitimately disappear before expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_name: String,
    pub task_id: TaskId,
    pub namespace: String,
    pub expire_time: DateTime<Utc>,
    pub files: Vec<FileMetadata>,
}

impl JobMetadata {
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        serde_json::from_slice(&data).map_err(|err| DepotError::Metadata {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }
}
