use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use super::errors::Result;
use super::metadata::JobMetadata;

/// Outcome of one expiry sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Jobs whose metadata record was removed.
    pub jobs_expired: usize,
    /// Data files deleted across all expired jobs.
    pub files_removed: usize,
    /// Corrupt records, unreadable directories, and failed deletions.
    pub errors: usize,
}

/// Reclaims storage for jobs whose expire time has passed.
///
/// Operates purely on persisted metadata and the filesystem; it never
/// talks to the job registry. Callers must only point it at jobs that are
/// no longer being written; that invariant is the coordinator's to keep.
pub struct ExpirySweeper {
    root_dir: PathBuf,
    metadata_dir: PathBuf,
}

impl ExpirySweeper {
    pub fn new(root_dir: impl Into<PathBuf>, metadata_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            metadata_dir: metadata_dir.into(),
        }
    }

    /// One full pass over the metadata store.
    ///
    /// Corrupt records and failed deletions are logged, counted, and
    /// skipped; no single entry aborts the pass. A missing metadata
    /// directory is a no-op (nothing persisted yet).
    pub async fn sweep(&self) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        if !tokio::fs::try_exists(&self.metadata_dir).await? {
            return Ok(stats);
        }

        let mut pending = vec![self.metadata_dir.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("cannot read metadata dir {}: {err}", dir.display());
                    stats.errors += 1;
                    continue;
                }
            };

            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        let path = entry.path();
                        match entry.file_type().await {
                            Ok(file_type) if file_type.is_dir() => pending.push(path),
                            Ok(file_type) if file_type.is_file() => {
                                self.sweep_record(&path, &mut stats).await;
                            }
                            Ok(_) => {}
                            Err(err) => {
                                warn!("cannot stat {}: {err}", path.display());
                                stats.errors += 1;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!("error walking {}: {err}", dir.display());
                        stats.errors += 1;
                        break;
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn sweep_record(&self, meta_path: &Path, stats: &mut SweepStats) {
        let metadata = match JobMetadata::load(meta_path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("corrupt metadata file {}: {err}", meta_path.display());
                stats.errors += 1;
                return;
            }
        };

        if metadata.expire_time > Utc::now() {
            return;
        }

        info!(
            "removing files for expired task {}({})",
            metadata.job_name, metadata.task_id
        );

        for file_meta in &metadata.files {
            let logical = self
                .root_dir
                .join(&metadata.namespace)
                .join(&file_meta.name);
            // gzip jobs store under <name>.gz while metadata keeps the
            // logical name
            let abs_path = match pick_existing(logical).await {
                Some(path) => path,
                None => {
                    warn!(
                        "file {} of job {} does not exist",
                        file_meta.name, metadata.task_id
                    );
                    continue;
                }
            };
            info!("removing file {}", abs_path.display());
            match tokio::fs::remove_file(&abs_path).await {
                Ok(()) => stats.files_removed += 1,
                Err(err) => {
                    warn!("cannot remove file {}: {err}", abs_path.display());
                    stats.errors += 1;
                }
            }
        }

        // the record goes regardless of per-file failures; a failed record
        // removal leaves it eligible for the next sweep
        info!("removing metadata {}", meta_path.display());
        match tokio::fs::remove_file(meta_path).await {
            Ok(()) => stats.jobs_expired += 1,
            Err(err) => {
                warn!("cannot remove metadata {}: {err}", meta_path.display());
                stats.errors += 1;
            }
        }
    }
}

async fn pick_existing(logical: PathBuf) -> Option<PathBuf> {
    if tokio::fs::try_exists(&logical).await.unwrap_or(false) {
        return Some(logical);
    }
    let mut gz = logical.into_os_string();
    gz.push(".gz");
    let gz = PathBuf::from(gz);
    if tokio::fs::try_exists(&gz).await.unwrap_or(false) {
        return Some(gz);
    }
    None
}
