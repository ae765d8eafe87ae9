use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Backup job identifier, chosen by the uploading client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One live backup job, registered before any of its connections arrive.
///
/// Removal is the coordinator's call and must happen only after
/// `wait_job` has observed the connection count at zero.
#[derive(Clone)]
pub struct ActiveJob {
    pub task_id: TaskId,
    /// Subdirectory under the storage root holding this job's files.
    pub namespace: String,
    /// Compress content before writing it to disk.
    pub gzip: bool,
    /// One event per successfully stored file. The channel is bounded, so
    /// a slow coordinator throttles the sending connection handlers.
    pub completion_tx: mpsc::Sender<FileMetadata>,
}

/// Record of one file received for a job. Produced exactly once per
/// successful transfer, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Logical filename, without the `.gz` suffix gzip jobs store under.
    pub name: String,
    /// Peer address the upload came from.
    pub source_addr: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Bytes read from the wire, before any compression.
    pub size: u64,
}

const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<ActiveJob>();
        assert_send::<FileMetadata>();
    }
};
