use std::path::PathBuf;
use thiserror::Error;
use super::types::TaskId;

#[derive(Error, Debug)]
pub enum DepotError {
    #[error("IO error {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("cannot find task id '{0}' in current job list")]
    UnknownTask(TaskId),

    #[error("task id '{0}' is already registered")]
    DuplicateTask(TaskId),

    #[error("corrupt job metadata {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },

    #[error("job completion channel closed")]
    JobGone,
}

pub type Result<T> = std::result::Result<T, DepotError>;
