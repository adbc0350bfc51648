//! `blobd pause` – broadcast a pause on the configured pause topic.

use anyhow::Result;
use blobd_core::bus;
use blobd_core::config::BlobdConfig;
use std::path::Path;

pub async fn run_pause(cfg: &BlobdConfig, socket: &Path) -> Result<()> {
    bus::send(socket, &cfg.pause_topic, b"").await?;
    println!("Pause broadcast sent on {}", cfg.pause_topic);
    Ok(())
}
