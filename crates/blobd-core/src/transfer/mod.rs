//! Transfer engine seam: start, resume, poll, pause.
//!
//! The worker only talks to these traits. [`CurlEngine`] is the HTTP
//! implementation used by the agent; tests substitute scripted engines.

mod curl_engine;
mod options;

pub use curl_engine::CurlEngine;
pub use options::TransferOptions;

use std::path::{Path, PathBuf};

use crate::checkpoint::{Checkpoint, CheckpointError};
use crate::job::SourceLocation;

/// Errors raised by a transfer engine or while preparing a transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid object URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("HTTP {0}")]
    Http(u32),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("corrupt checkpoint: {0}")]
    CorruptCheckpoint(String),
    #[error("checkpoint expects {expected} bytes in {}, found {found}", .path.display())]
    CheckpointMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
    #[error("transfer thread panicked")]
    Panicked,
    #[error("{0}")]
    Engine(String),
}

/// Starts transfers, fresh or from a checkpoint.
///
/// Calls may block (connection setup, file I/O); the worker runs them on the
/// blocking pool.
pub trait TransferEngine: Send + Sync {
    /// Starts a fresh transfer of `source` into `destination`.
    fn start(
        &self,
        source: &SourceLocation,
        destination: &Path,
    ) -> Result<Box<dyn Transfer>, TransferError>;

    /// Resumes a transfer from a token produced by [`Transfer::pause`].
    fn resume(&self, checkpoint: &Checkpoint) -> Result<Box<dyn Transfer>, TransferError>;
}

/// An in-flight transfer. Dropping it releases the engine's resources.
pub trait Transfer: Send {
    /// Fraction transferred in `[0.0, 1.0]`, if known.
    fn progress(&self) -> Option<f64>;

    /// True once the transfer has completed, successfully or not.
    fn is_done(&self) -> bool;

    /// True if the transfer completed exceptionally.
    fn is_failed(&self) -> bool;

    /// Stops the transfer and returns a token to resume it later.
    fn pause(self: Box<Self>) -> Result<Checkpoint, TransferError>;
}
