//! `blobd run` – serve the bus and dispatch jobs until Ctrl-C.

use anyhow::Result;
use blobd_core::bus::{self, LocalBus};
use blobd_core::config::BlobdConfig;
use blobd_core::dispatcher::{Dispatcher, DispatcherSettings};
use blobd_core::publisher::StatusPublisher;
use blobd_core::transfer::CurlEngine;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Command-line values that take precedence over config.toml.
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub download_topic: Option<String>,
    pub pause_topic: Option<String>,
    pub job_update_topic: Option<String>,
    pub destination_folder: Option<PathBuf>,
}

impl RunOverrides {
    pub fn apply(self, cfg: &mut BlobdConfig) {
        if let Some(topic) = self.download_topic {
            cfg.download_topic = topic;
        }
        if let Some(topic) = self.pause_topic {
            cfg.pause_topic = topic;
        }
        if let Some(topic) = self.job_update_topic {
            cfg.job_update_topic = topic;
        }
        if let Some(dir) = self.destination_folder {
            cfg.destination_folder = Some(dir);
        }
    }
}

pub async fn run_agent(mut cfg: BlobdConfig, overrides: RunOverrides, socket: &Path) -> Result<()> {
    overrides.apply(&mut cfg);
    let destination_folder = cfg.resolve_destination_folder()?;

    let engine = Arc::new(CurlEngine::new(&cfg.object_endpoint, (&cfg.transfer).into())?);
    let local_bus = LocalBus::new();
    let publisher = StatusPublisher::new(Arc::new(local_bus.clone()), cfg.job_update_topic.clone());
    let dispatcher = Dispatcher::new(
        engine,
        publisher,
        DispatcherSettings::from_config(&cfg, destination_folder.clone()),
    );

    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let listener = bus::spawn_listener(&local_bus, socket, tx)?;
    tracing::info!(
        download_topic = %cfg.download_topic,
        pause_topic = %cfg.pause_topic,
        job_update_topic = %cfg.job_update_topic,
        destination = %destination_folder.display(),
        "agent running"
    );
    println!(
        "blobd listening on {} (downloads to {})",
        socket.display(),
        destination_folder.display()
    );

    dispatcher
        .run(rx, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    listener.abort();
    let _ = std::fs::remove_file(socket);
    println!("blobd stopped; active jobs were paused");
    Ok(())
}
