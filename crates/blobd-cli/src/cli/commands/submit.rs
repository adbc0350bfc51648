//! `blobd submit <job-id> <bucket> <key>` – publish a job on the download topic.

use anyhow::{Context, Result};
use blobd_core::bus;
use blobd_core::config::BlobdConfig;
use blobd_core::job::JobSpec;
use blobd_core::paths;
use std::path::Path;

pub async fn run_submit(
    cfg: &BlobdConfig,
    socket: &Path,
    job_id: &str,
    bucket: &str,
    key: &str,
) -> Result<()> {
    let spec = JobSpec::new(job_id, bucket, key);
    // The agent would drop it anyway; fail here so the user sees why.
    paths::validate_source(&spec.source).context("invalid object location")?;
    let payload = spec.encode()?;
    bus::send(socket, &cfg.download_topic, &payload).await?;
    println!("Submitted job {job_id} ({bucket}/{key})");
    Ok(())
}
