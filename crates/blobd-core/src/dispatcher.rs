//! Dispatcher: routes inbound control messages to worker lifecycle operations.
//!
//! Job submissions register and start a worker unless one is already active
//! for the job id; a pause broadcast cancels every worker and clears the
//! registry without waiting. Nothing that goes wrong while handling one
//! message escapes this module.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::bus::BusMessage;
use crate::config::BlobdConfig;
use crate::job::{JobId, JobSpec};
use crate::paths;
use crate::publisher::StatusPublisher;
use crate::registry::JobRegistry;
use crate::transfer::TransferEngine;
use crate::worker::{JobWorker, WorkerOutcome};

/// Topics and local settings the dispatcher needs.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub download_topic: String,
    pub pause_topic: String,
    pub destination_folder: PathBuf,
    pub poll_interval: Duration,
}

impl DispatcherSettings {
    pub fn from_config(cfg: &BlobdConfig, destination_folder: PathBuf) -> Self {
        Self {
            download_topic: cfg.download_topic.clone(),
            pause_topic: cfg.pause_topic.clone(),
            destination_folder,
            poll_interval: cfg.poll_interval(),
        }
    }
}

/// Result of handling one job submission.
#[derive(Debug)]
pub enum Dispatch {
    /// A new worker was registered and started.
    Started(JoinHandle<WorkerOutcome>),
    /// A worker for this job id is already active; the submission was dropped.
    Duplicate(JobId),
    /// The payload could not be decoded; the submission was dropped.
    Rejected,
}

pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    engine: Arc<dyn TransferEngine>,
    publisher: StatusPublisher,
    settings: DispatcherSettings,
    destination_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<dyn TransferEngine>,
        publisher: StatusPublisher,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            engine,
            publisher,
            settings,
            destination_locks: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Routes a message by topic. Unknown topics are ignored.
    pub fn on_message(&self, topic: &str, payload: &[u8]) {
        if topic == self.settings.download_topic {
            self.on_job_message(payload);
        } else if topic == self.settings.pause_topic {
            self.on_pause_message(payload);
        } else {
            tracing::debug!(topic, "ignoring message on unrelated topic");
        }
    }

    /// Decodes a job submission and starts a worker for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_job_message(&self, raw: &[u8]) -> Dispatch {
        let spec = match JobSpec::decode(raw) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::error!(
                    payload = %String::from_utf8_lossy(raw),
                    "dropping job message: {}",
                    e
                );
                return Dispatch::Rejected;
            }
        };

        let Some(registration) = self.registry.try_register(&spec.job_id) else {
            tracing::info!(job_id = %spec.job_id, "job is already being processed");
            return Dispatch::Duplicate(spec.job_id);
        };

        let destination = paths::destination_path(&self.settings.destination_folder, &spec.source);
        tracing::info!(
            job_id = %spec.job_id,
            bucket = %spec.source.bucket,
            key = %spec.source.key,
            destination = %destination.display(),
            "dispatching job"
        );
        let worker = JobWorker {
            destination_lock: self.destination_lock(&destination),
            spec,
            destination,
            engine: Arc::clone(&self.engine),
            publisher: self.publisher.clone(),
            poll_interval: self.settings.poll_interval,
            registration,
        };
        Dispatch::Started(self.tracker.spawn(worker.run()))
    }

    /// Pause broadcast: the payload is ignored. Returns how many workers were signalled.
    pub fn on_pause_message(&self, _raw: &[u8]) -> usize {
        let cancelled = self.registry.cancel_all();
        tracing::info!(cancelled, "pause broadcast: signalled all workers");
        cancelled
    }

    /// Removes `job_id` from the registry if present; a no-op otherwise.
    ///
    /// Workers started here do not call this: they deregister through their
    /// [`Registration`](crate::registry::Registration) on exit, which removes
    /// only their own entry. This is the unconditional form, for callers that
    /// track job completion outside the dispatcher.
    pub fn on_worker_done(&self, job_id: &str) {
        if self.registry.deregister(job_id) {
            tracing::debug!(job_id, "job deregistered");
        }
    }

    /// Handles inbound messages one at a time until `shutdown` resolves or the
    /// channel closes, then pauses every worker and waits for them to finish.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<BusMessage>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                msg = inbound.recv() => match msg {
                    Some(msg) => self.on_message(&msg.topic, &msg.payload),
                    None => {
                        tracing::info!("inbound channel closed");
                        break;
                    }
                },
            }
        }
        self.shutdown().await;
    }

    /// Pauses all workers and waits until each has written its checkpoint and exited.
    pub async fn shutdown(&self) {
        let cancelled = self.registry.cancel_all();
        self.tracker.close();
        tracing::info!(cancelled, active = self.tracker.len(), "waiting for workers");
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn destination_lock(&self, destination: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .destination_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Drop locks nobody holds or waits on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(destination.to_path_buf()).or_default())
    }
}
