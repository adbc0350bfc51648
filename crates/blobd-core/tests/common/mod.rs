//! Shared helpers for blobd-core integration tests.

#![allow(dead_code)]

pub mod fake_engine;
pub mod object_server;
pub mod recording;

use std::sync::Arc;
use std::time::Duration;

use blobd_core::dispatcher::{Dispatcher, DispatcherSettings};
use blobd_core::publisher::StatusPublisher;
use blobd_core::transfer::TransferEngine;

pub const UPDATE_TOPIC: &str = "jobs/update";

/// Dispatcher with a 10ms poll interval, publishing into `transport`.
pub fn dispatcher(
    engine: Arc<dyn TransferEngine>,
    transport: Arc<recording::RecordingTransport>,
    destination_folder: &std::path::Path,
) -> Dispatcher {
    dispatcher_with_poll(engine, transport, destination_folder, Duration::from_millis(10))
}

pub fn dispatcher_with_poll(
    engine: Arc<dyn TransferEngine>,
    transport: Arc<recording::RecordingTransport>,
    destination_folder: &std::path::Path,
    poll_interval: Duration,
) -> Dispatcher {
    let settings = DispatcherSettings {
        download_topic: "jobs/download".to_string(),
        pause_topic: "jobs/pause".to_string(),
        destination_folder: destination_folder.to_path_buf(),
        poll_interval,
    };
    Dispatcher::new(engine, StatusPublisher::new(transport, UPDATE_TOPIC), settings)
}

pub fn job_payload(job_id: &str, bucket: &str, key: &str) -> Vec<u8> {
    format!(
        r#"{{"jobId":"{}","s3Bucket":"{}","key":"{}"}}"#,
        job_id, bucket, key
    )
    .into_bytes()
}

/// Polls `cond` every 5ms until it holds, panicking after 5s.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
