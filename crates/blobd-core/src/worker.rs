//! Job worker: drives one job from dispatch to its terminal status.
//!
//! `CREATED → {RESUMING | STARTING} → RUNNING → {SUCCEEDED | FAILED | PAUSED} → TERMINATED`.
//! TERMINATED is reached when the worker's [`Registration`] is dropped, which
//! happens on every path out of [`JobWorker::run`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::Checkpoint;
use crate::job::{JobSpec, StatusUpdate};
use crate::paths;
use crate::publisher::StatusPublisher;
use crate::registry::Registration;
use crate::transfer::{Transfer, TransferEngine, TransferError};

/// How a worker's transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Succeeded,
    Failed,
    Paused,
}

impl WorkerOutcome {
    /// The single terminal record published for this outcome.
    pub fn status_update(self, job_id: &str) -> StatusUpdate {
        match self {
            WorkerOutcome::Succeeded => StatusUpdate::succeeded(job_id),
            WorkerOutcome::Failed => StatusUpdate::failed(job_id),
            WorkerOutcome::Paused => StatusUpdate::paused(job_id),
        }
    }
}

/// Everything one worker needs; built by the dispatcher, consumed by [`JobWorker::run`].
pub(crate) struct JobWorker {
    pub(crate) spec: JobSpec,
    pub(crate) destination: PathBuf,
    pub(crate) engine: Arc<dyn TransferEngine>,
    pub(crate) publisher: StatusPublisher,
    pub(crate) poll_interval: Duration,
    /// Held for the worker's lifetime so a resubmission waits for this
    /// worker's checkpoint before looking for one.
    pub(crate) destination_lock: Arc<Mutex<()>>,
    pub(crate) registration: Registration,
}

impl JobWorker {
    pub(crate) async fn run(self) -> WorkerOutcome {
        let JobWorker {
            spec,
            destination,
            engine,
            publisher,
            poll_interval,
            destination_lock,
            registration,
        } = self;
        let job_id = spec.job_id.clone();
        let cancel = registration.cancel_token();

        let _destination_guard = destination_lock.lock_owned().await;
        let outcome = if cancel.is_cancelled() {
            tracing::info!(job_id = %job_id, "cancelled before the transfer started");
            WorkerOutcome::Paused
        } else {
            let supervisor = Supervisor {
                job_id: &job_id,
                destination: &destination,
                publisher: &publisher,
                cancel: &cancel,
                poll_interval,
            };
            supervisor.drive(&spec, engine).await
        };

        publisher.publish(&outcome.status_update(&job_id));
        drop(registration);
        tracing::info!(job_id = %job_id, ?outcome, "worker terminated");
        outcome
    }
}

struct Supervisor<'a> {
    job_id: &'a str,
    destination: &'a Path,
    publisher: &'a StatusPublisher,
    cancel: &'a CancellationToken,
    poll_interval: Duration,
}

impl Supervisor<'_> {
    async fn drive(&self, spec: &JobSpec, engine: Arc<dyn TransferEngine>) -> WorkerOutcome {
        let checkpoint_path = paths::checkpoint_path(self.destination);
        let transfer = match self.open_transfer(spec, engine, &checkpoint_path).await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(job_id = %self.job_id, "could not start transfer: {}", e);
                return WorkerOutcome::Failed;
            }
        };
        self.poll(transfer, checkpoint_path).await
    }

    /// RESUMING when a checkpoint exists, STARTING otherwise. A checkpoint that
    /// cannot be read or resumed fails the job; it never falls back to a fresh start.
    async fn open_transfer(
        &self,
        spec: &JobSpec,
        engine: Arc<dyn TransferEngine>,
        checkpoint_path: &Path,
    ) -> Result<Box<dyn Transfer>, TransferError> {
        let job_id = self.job_id.to_string();
        let source = spec.source.clone();
        let destination = self.destination.to_path_buf();
        let checkpoint_path = checkpoint_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if checkpoint_path.exists() {
                tracing::info!(job_id = %job_id, path = %checkpoint_path.display(), "resuming from checkpoint");
                let checkpoint = Checkpoint::load_from(&checkpoint_path)?;
                engine.resume(&checkpoint)
            } else {
                tracing::info!(
                    job_id = %job_id,
                    bucket = %source.bucket,
                    key = %source.key,
                    destination = %destination.display(),
                    "starting transfer"
                );
                engine.start(&source, &destination)
            }
        })
        .await
        .map_err(|_| TransferError::Panicked)?
    }

    /// RUNNING: report progress every interval until the engine is done or the
    /// cancellation signal fires. Cancellation wins a tie with completion.
    async fn poll(&self, transfer: Box<dyn Transfer>, checkpoint_path: PathBuf) -> WorkerOutcome {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return self.pause(transfer, checkpoint_path).await;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            let fraction = transfer.progress().unwrap_or(0.0);
            self.publisher
                .publish(&StatusUpdate::progress(self.job_id, fraction));
            if transfer.is_done() {
                break;
            }
        }
        if transfer.is_failed() {
            tracing::warn!(job_id = %self.job_id, "transfer failed");
            WorkerOutcome::Failed
        } else {
            tracing::info!(job_id = %self.job_id, "transfer succeeded");
            WorkerOutcome::Succeeded
        }
    }

    /// PAUSED: stop the transfer and persist its checkpoint, best effort.
    async fn pause(&self, transfer: Box<dyn Transfer>, checkpoint_path: PathBuf) -> WorkerOutcome {
        tracing::info!(job_id = %self.job_id, "pausing transfer");
        let path = checkpoint_path.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<(), TransferError> {
            let checkpoint = transfer.pause()?;
            checkpoint.persist(&path)?;
            Ok(())
        })
        .await
        .unwrap_or(Err(TransferError::Panicked));
        match result {
            Ok(()) => tracing::info!(
                job_id = %self.job_id,
                path = %checkpoint_path.display(),
                "checkpoint written"
            ),
            Err(e) => tracing::warn!(
                job_id = %self.job_id,
                path = %checkpoint_path.display(),
                "could not persist checkpoint: {}",
                e
            ),
        }
        WorkerOutcome::Paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;

    #[test]
    fn outcome_maps_to_terminal_record() {
        let u = WorkerOutcome::Succeeded.status_update("d1");
        assert_eq!((u.status, u.reason.as_str()), (JobStatus::Succeeded, "done"));
        let u = WorkerOutcome::Failed.status_update("d1");
        assert_eq!((u.status, u.reason.as_str()), (JobStatus::Failed, "fail"));
        let u = WorkerOutcome::Paused.status_update("d1");
        assert_eq!((u.status, u.reason.as_str()), (JobStatus::InProgress, "paused"));
        assert!(u.is_terminal());
    }
}
