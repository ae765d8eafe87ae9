pub mod config;
pub mod core;

pub use self::core::{
    ActiveJob,
    DepotError,
    ExpirySweeper,
    FileMetadata,
    JobMetadata,
    JobRegistry,
    Result,
    StorageServer,
    SweepStats,
    TaskId,
};
