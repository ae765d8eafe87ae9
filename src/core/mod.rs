mod errors;
mod metadata;
mod protocol;
mod registry;
mod server;
mod sink;
mod sweeper;
mod types;


pub use errors::{DepotError, Result};
pub use metadata::JobMetadata;
pub use protocol::{JOB_FINISH, MAX_TOKEN_LEN, ProtocolReader};
pub use registry::{ConnectionGuard, JobRegistry};
pub use server::StorageServer;
pub use sink::FileSink;
pub use sweeper::{ExpirySweeper, SweepStats};
pub use types::{ActiveJob, FileMetadata, TaskId};
