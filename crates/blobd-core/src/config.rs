use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::transfer::TransferOptions;

/// Curl tuning for object transfers (optional `[transfer]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Seconds to wait for the blob store to accept a connection.
    pub connect_timeout_secs: u64,
    /// Abort a transfer whose throughput stays below this many bytes/sec...
    pub low_speed_limit: u32,
    /// ...for this many seconds.
    pub low_speed_time_secs: u64,
    /// Optional receive rate cap in bytes per second (None = no cap).
    #[serde(default)]
    pub max_recv_speed: Option<u64>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit: 1024,
            low_speed_time_secs: 60,
            max_recv_speed: None,
        }
    }
}

impl From<&TransferConfig> for TransferOptions {
    fn from(cfg: &TransferConfig) -> Self {
        TransferOptions {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            low_speed_limit: cfg.low_speed_limit,
            low_speed_time: Duration::from_secs(cfg.low_speed_time_secs),
            max_recv_speed: cfg.max_recv_speed,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Global configuration loaded from `~/.config/blobd/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobdConfig {
    /// Topic carrying job submissions.
    pub download_topic: String,
    /// Topic carrying pause broadcasts.
    pub pause_topic: String,
    /// Topic status updates are published to.
    pub job_update_topic: String,
    /// Root folder for downloaded objects (None = `~/.local/share/blobd/downloads`).
    #[serde(default)]
    pub destination_folder: Option<PathBuf>,
    /// Interval between progress reports, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Base URL of the blob store; objects are fetched from `<endpoint>/<bucket>/<key>`.
    pub object_endpoint: String,
    /// Bus socket path (None = `~/.local/state/blobd/bus.sock`).
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Default for BlobdConfig {
    fn default() -> Self {
        Self {
            download_topic: "blobd/jobs/download".to_string(),
            pause_topic: "blobd/jobs/pause".to_string(),
            job_update_topic: "blobd/jobs/update".to_string(),
            destination_folder: None,
            poll_interval_ms: default_poll_interval_ms(),
            object_endpoint: "http://127.0.0.1:9000".to_string(),
            socket_path: None,
            transfer: TransferConfig::default(),
        }
    }
}

impl BlobdConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Configured destination folder, or the XDG data default (created if missing).
    pub fn resolve_destination_folder(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.destination_folder {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("blobd")?;
        Ok(xdg_dirs.create_data_directory("downloads")?)
    }

    /// Configured bus socket, or the XDG state default.
    pub fn resolve_socket_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.socket_path {
            return Ok(path.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("blobd")?;
        Ok(xdg_dirs.place_state_file("bus.sock")?)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("blobd")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BlobdConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = BlobdConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: BlobdConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
