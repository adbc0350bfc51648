//! Registry of live job workers, keyed by job id.
//!
//! The dispatcher inserts and checks for duplicates on the message path;
//! workers remove their own entry from their task when they terminate. Both
//! go through one mutex.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::job::JobId;

/// Reference to a running worker: its job id and its cancellation signal.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    job_id: JobId,
    seq: u64,
    cancel: CancellationToken,
}

impl WorkerHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Wakes the worker's poll wait; the worker pauses and checkpoints.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Shared map of job id -> worker handle. At most one entry per job id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, WorkerHandle>>,
    next_seq: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, WorkerHandle>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new worker for `job_id`, or returns `None` if one is already active.
    ///
    /// Dropping the returned [`Registration`] removes the entry again, unless it
    /// has since been cleared or replaced by a newer worker.
    pub fn try_register(self: &Arc<Self>, job_id: &str) -> Option<Registration> {
        let mut jobs = self.jobs();
        if jobs.contains_key(job_id) {
            return None;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let handle = WorkerHandle {
            job_id: job_id.to_string(),
            seq,
            cancel: CancellationToken::new(),
        };
        let cancel = handle.cancel.clone();
        jobs.insert(job_id.to_string(), handle);
        Some(Registration {
            registry: Arc::clone(self),
            job_id: job_id.to_string(),
            seq,
            cancel,
        })
    }

    /// Removes `job_id` if present. Returns whether an entry was removed.
    pub fn deregister(&self, job_id: &str) -> bool {
        self.jobs().remove(job_id).is_some()
    }

    /// Removes the entry only if it still belongs to worker `seq`.
    fn deregister_worker(&self, job_id: &str, seq: u64) -> bool {
        let mut jobs = self.jobs();
        match jobs.get(job_id) {
            Some(handle) if handle.seq == seq => {
                jobs.remove(job_id);
                true
            }
            _ => false,
        }
    }

    /// Signals cancellation to every registered worker and clears the registry.
    /// Does not wait for the workers. Returns the number of workers signalled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<WorkerHandle> = self.jobs().drain().map(|(_, h)| h).collect();
        for handle in &drained {
            handle.cancel();
        }
        drained.len()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs().contains_key(job_id)
    }

    pub fn get(&self, job_id: &str) -> Option<WorkerHandle> {
        self.jobs().get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    /// Registered job ids, sorted.
    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.jobs().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// A worker's claim on its registry entry. Deregisters when dropped.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<JobRegistry>,
    job_id: JobId,
    seq: u64,
    cancel: CancellationToken,
}

impl Registration {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Cancellation signal for this worker.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.deregister_worker(&self.job_id, self.seq) {
            tracing::debug!(job_id = %self.job_id, "worker deregistered");
        }
    }
}
