//! `blobd watch` – print status updates published by a running agent.

use anyhow::Result;
use blobd_core::bus::BusSubscription;
use blobd_core::config::BlobdConfig;
use blobd_core::job::StatusUpdate;
use std::path::Path;

pub async fn run_watch(cfg: &BlobdConfig, socket: &Path, job: Option<&str>) -> Result<()> {
    let mut sub = BusSubscription::connect(socket).await?;
    while let Some(msg) = sub.next().await? {
        if msg.topic != cfg.job_update_topic {
            continue;
        }
        let update: StatusUpdate = match serde_json::from_slice(&msg.payload) {
            Ok(update) => update,
            Err(e) => {
                tracing::debug!("skipping undecodable update: {}", e);
                continue;
            }
        };
        if job.is_some_and(|id| id != update.job_id) {
            continue;
        }
        println!("{}  {}  {}", update.job_id, update.status, update.reason);
        if job.is_some() && update.is_terminal() {
            break;
        }
    }
    Ok(())
}
