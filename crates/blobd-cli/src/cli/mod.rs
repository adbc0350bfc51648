//! CLI for the blobd download agent.

mod commands;

use anyhow::Result;
use blobd_core::config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_agent, run_pause, run_submit, run_watch, RunOverrides};

/// Top-level CLI for the blobd download agent.
#[derive(Debug, Parser)]
#[command(name = "blobd")]
#[command(about = "blobd: pausable object downloads driven by a local message bus", long_about = None)]
pub struct Cli {
    /// Bus socket to serve or connect to (default: from config, else the XDG state dir).
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Serve the bus and process download and pause messages until Ctrl-C.
    Run {
        /// Topic carrying job submissions.
        #[arg(long, value_name = "TOPIC")]
        download_topic: Option<String>,
        /// Topic carrying pause broadcasts.
        #[arg(long, value_name = "TOPIC")]
        pause_topic: Option<String>,
        /// Topic that status updates are published on.
        #[arg(long, value_name = "TOPIC")]
        job_update_topic: Option<String>,
        /// Root directory for downloaded objects.
        #[arg(long, value_name = "DIR")]
        destination_folder: Option<PathBuf>,
    },

    /// Submit a download job to a running agent.
    Submit {
        /// Job identifier.
        job_id: String,
        /// Source bucket.
        bucket: String,
        /// Object key inside the bucket.
        key: String,
    },

    /// Broadcast a pause to a running agent; every active job checkpoints and stops.
    Pause,

    /// Print status updates from a running agent.
    Watch {
        /// Exit after the first terminal update for this job.
        #[arg(long, value_name = "JOB_ID")]
        job: Option<String>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let socket = match cli.socket {
            Some(path) => path,
            None => cfg.resolve_socket_path()?,
        };

        match cli.command {
            CliCommand::Run {
                download_topic,
                pause_topic,
                job_update_topic,
                destination_folder,
            } => {
                let overrides = RunOverrides {
                    download_topic,
                    pause_topic,
                    job_update_topic,
                    destination_folder,
                };
                run_agent(cfg, overrides, &socket).await?;
            }
            CliCommand::Submit {
                job_id,
                bucket,
                key,
            } => run_submit(&cfg, &socket, &job_id, &bucket, &key).await?,
            CliCommand::Pause => run_pause(&cfg, &socket).await?,
            CliCommand::Watch { job } => run_watch(&cfg, &socket, job.as_deref()).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
