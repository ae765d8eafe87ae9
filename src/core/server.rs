use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::{DepotError, Result};
use super::protocol::{JOB_FINISH, ProtocolReader};
use super::registry::{ConnectionGuard, JobRegistry};
use super::sink::FileSink;
use super::types::FileMetadata;

/// Accepts upload connections and writes their content under the storage
/// root, one file per connection.
pub struct StorageServer {
    registry: Arc<JobRegistry>,
    root_dir: PathBuf,
}

impl StorageServer {
    pub fn new(registry: Arc<JobRegistry>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            root_dir: root_dir.into(),
        }
    }

    /// Bind separately from serving so callers can learn the actual
    /// address of an ephemeral port before connections start.
    pub async fn bind(addr: &str) -> Result<TcpListener> {
        info!("listening on {addr}");
        Ok(TcpListener::bind(addr).await?)
    }

    /// Accept loop. Every accepted connection gets its own task
    /// immediately, so one slow client never stalls the others. The loop
    /// ends on listener failure or when `shutdown` fires; in-flight
    /// handlers are left to finish on their own.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("accept loop stopped");
                    return;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!("error during accept: {err}");
                            return;
                        }
                    };
                    debug!("new connection from {peer}");
                    let server = self.clone();
                    tokio::spawn(async move {
                        match server.handle_connection(stream, peer.to_string()).await {
                            Ok(()) => info!("connection from {peer} handled successfully"),
                            Err(err) => warn!("error during connection from {peer}: {err}"),
                        }
                    });
                }
            }
        }
    }

    /// Runs the per-connection protocol: resolve the task id to a live
    /// job, hold a connection slot for the duration, stream the file to
    /// disk, and report the completed file on the job's channel.
    ///
    /// Generic over the stream so tests can drive it with in-memory
    /// duplexes instead of sockets.
    pub async fn handle_connection<S>(&self, stream: S, peer: String) -> Result<()>
    where
        S: AsyncRead + Unpin,
    {
        let mut reader = ProtocolReader::new(stream);

        let task_id = reader.read_task_id().await?;
        let job = self
            .registry
            .get_job(&task_id)
            .ok_or_else(|| DepotError::UnknownTask(task_id.clone()))?;

        // counted from here on; the guard releases the slot on every exit
        // path below, early returns and panics included
        let _slot = ConnectionGuard::acquire(self.registry.clone(), task_id);

        let filename = reader.read_filename().await?;
        if filename == JOB_FINISH {
            warn!("got deprecated magic word '{JOB_FINISH}' as filename, ignoring");
            return Ok(());
        }

        let start_time = Utc::now();

        let mut save_path = self.root_dir.join(&job.namespace).join(&filename);
        if job.gzip {
            let mut with_suffix = save_path.into_os_string();
            with_suffix.push(".gz");
            save_path = PathBuf::from(with_suffix);
        }

        info!("saving file {}", save_path.display());
        if let Some(parent) = save_path.parent() {
            let mut builder = tokio::fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            builder.mode(0o750);
            builder.create(parent).await?;
        }

        let file = tokio::fs::File::create(&save_path).await?;
        let mut sink = FileSink::new(file, job.gzip);
        let size = reader.copy_content(&mut sink).await?;
        sink.finish().await?;

        let file_meta = FileMetadata {
            name: filename,
            source_addr: peer,
            start_time,
            end_time: Utc::now(),
            size,
        };

        debug!("sending metadata for file {} to job coordinator", file_meta.name);
        // a full channel blocks here on purpose: ingestion runs at the
        // coordinator's consumption rate
        job.completion_tx
            .send(file_meta)
            .await
            .map_err(|_| DepotError::JobGone)?;

        Ok(())
    }
}
