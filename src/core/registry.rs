use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::errors::{DepotError, Result};
use super::types::{ActiveJob, TaskId};

struct JobEntry {
    job: ActiveJob,
    connections: usize,
}

/// Live jobs and the number of open upload connections per job.
///
/// All state sits behind one mutex, never held across an await.
/// Constructed explicitly and injected into whatever needs it; tests run
/// as many independent registries as they like.
pub struct JobRegistry {
    jobs: Mutex<HashMap<TaskId, JobEntry>>,
    drained: Notify,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            drained: Notify::new(),
        }
    }

    /// Register a job. The task id must not already be live.
    pub fn add_job(&self, job: ActiveJob) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&job.task_id) {
            return Err(DepotError::DuplicateTask(job.task_id.clone()));
        }
        jobs.insert(job.task_id.clone(), JobEntry { job, connections: 0 });
        Ok(())
    }

    /// Unregister a job. Callers must have awaited `wait_job` first.
    pub fn remove_job(&self, task_id: &TaskId) {
        self.jobs.lock().unwrap().remove(task_id);
        // a waiter parked on a removed job has nothing left to wait for
        self.drained.notify_waiters();
    }

    pub fn get_job(&self, task_id: &TaskId) -> Option<ActiveJob> {
        self.jobs
            .lock()
            .unwrap()
            .get(task_id)
            .map(|entry| entry.job.clone())
    }

    pub fn add_connection(&self, task_id: &TaskId) {
        if let Some(entry) = self.jobs.lock().unwrap().get_mut(task_id) {
            entry.connections += 1;
        }
    }

    pub fn remove_connection(&self, task_id: &TaskId) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(entry) = jobs.get_mut(task_id) {
            entry.connections = entry.connections.saturating_sub(1);
            if entry.connections == 0 {
                self.drained.notify_waiters();
            }
        }
    }

    pub fn connection_count(&self, task_id: &TaskId) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .get(task_id)
            .map(|entry| entry.connections)
            .unwrap_or(0)
    }

    /// Wait until no connections remain open for the task.
    ///
    /// The wakeup is armed before the count is checked, so a decrement
    /// landing between the check and the await is never missed. Returns
    /// immediately for unknown tasks and for counts already at zero.
    pub async fn wait_job(&self, task_id: &TaskId) {
        loop {
            let mut notified = std::pin::pin!(self.drained.notified());
            // notify_waiters only reaches futures that are already
            // registered; enable before looking at the count
            notified.as_mut().enable();
            {
                let jobs = self.jobs.lock().unwrap();
                match jobs.get(task_id) {
                    Some(entry) if entry.connections > 0 => {}
                    _ => return,
                }
            }
            notified.await;
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one connection slot for a task.
///
/// The slot is released on drop, which covers every exit path of a
/// connection handler, panics included.
pub struct ConnectionGuard {
    registry: Arc<JobRegistry>,
    task_id: TaskId,
}

impl ConnectionGuard {
    pub fn acquire(registry: Arc<JobRegistry>, task_id: TaskId) -> Self {
        registry.add_connection(&task_id);
        Self { registry, task_id }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.remove_connection(&self.task_id);
    }
}
