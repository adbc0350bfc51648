//! HTTP object transfer over curl, one OS thread per transfer.
//!
//! Objects are fetched from `<endpoint>/<bucket>/<key>`. A resumed transfer
//! asks for `Range: bytes=<offset>-` and appends to the destination file.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use url::Url;

use super::{Transfer, TransferEngine, TransferError, TransferOptions};
use crate::checkpoint::Checkpoint;
use crate::job::SourceLocation;
use crate::paths;

const RUNNING: u8 = 0;
const SUCCEEDED: u8 = 1;
const FAILED: u8 = 2;
const PAUSED: u8 = 3;

/// What a curl checkpoint token records (serialized as JSON).
#[derive(Debug, Serialize, Deserialize)]
struct ResumeState {
    url: String,
    destination: PathBuf,
    bytes_written: u64,
    total_bytes: Option<u64>,
}

/// Counters shared between a transfer handle and its curl thread.
#[derive(Debug)]
struct Shared {
    /// Bytes on disk, including the resume offset.
    written: AtomicU64,
    /// Expected object size; 0 until known.
    total: AtomicU64,
    state: AtomicU8,
    abort: AtomicBool,
}

impl Shared {
    fn new(written: u64, total: Option<u64>, state: u8) -> Self {
        Self {
            written: AtomicU64::new(written),
            total: AtomicU64::new(total.unwrap_or(0)),
            state: AtomicU8::new(state),
            abort: AtomicBool::new(false),
        }
    }

    fn total(&self) -> Option<u64> {
        match self.total.load(Ordering::Acquire) {
            0 => None,
            t => Some(t),
        }
    }

    fn fraction(&self) -> Option<f64> {
        let total = self.total()?;
        let written = self.written.load(Ordering::Acquire);
        Some((written as f64 / total as f64).min(1.0))
    }
}

/// [`TransferEngine`] that downloads objects over HTTP(S) with libcurl.
#[derive(Debug, Clone)]
pub struct CurlEngine {
    endpoint: Url,
    options: TransferOptions,
}

impl CurlEngine {
    pub fn new(endpoint: &str, options: TransferOptions) -> Result<Self, TransferError> {
        let endpoint = Url::parse(endpoint)?;
        if endpoint.cannot_be_a_base() {
            return Err(TransferError::Engine(format!(
                "endpoint {} cannot carry object paths",
                endpoint
            )));
        }
        Ok(Self { endpoint, options })
    }

    /// URL of an object: endpoint path + bucket + key segments (percent-encoded).
    pub fn object_url(&self, source: &SourceLocation) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&source.bucket)
                .extend(source.key.split('/'));
        }
        url
    }

    fn spawn(
        &self,
        url: String,
        destination: PathBuf,
        file: File,
        offset: u64,
        total: Option<u64>,
    ) -> Result<Box<dyn Transfer>, TransferError> {
        let shared = Arc::new(Shared::new(offset, total, RUNNING));
        let thread = {
            let shared = Arc::clone(&shared);
            let url = url.clone();
            let destination = destination.clone();
            let options = self.options;
            std::thread::Builder::new()
                .name("blobd-transfer".to_string())
                .spawn(move || run_transfer(&url, &destination, file, offset, options, &shared))?
        };
        tracing::info!(%url, destination = %destination.display(), offset, "transfer started");
        Ok(Box::new(CurlTransfer {
            url,
            destination,
            shared,
            thread: Some(thread),
        }))
    }
}

impl TransferEngine for CurlEngine {
    fn start(
        &self,
        source: &SourceLocation,
        destination: &Path,
    ) -> Result<Box<dyn Transfer>, TransferError> {
        let url = self.object_url(source);
        let file = File::create(destination)?;
        self.spawn(url.to_string(), destination.to_path_buf(), file, 0, None)
    }

    fn resume(&self, checkpoint: &Checkpoint) -> Result<Box<dyn Transfer>, TransferError> {
        let state: ResumeState = serde_json::from_slice(checkpoint.as_bytes())
            .map_err(|e| TransferError::CorruptCheckpoint(e.to_string()))?;
        let found = match fs::metadata(&state.destination) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if found < state.bytes_written {
            return Err(TransferError::CheckpointMismatch {
                path: state.destination,
                expected: state.bytes_written,
                found,
            });
        }
        if found > state.bytes_written {
            // A failed resume appended past the checkpoint; drop the tail.
            tracing::info!(
                destination = %state.destination.display(),
                found,
                keep = state.bytes_written,
                "truncating destination to checkpoint offset"
            );
            OpenOptions::new()
                .write(true)
                .open(&state.destination)?
                .set_len(state.bytes_written)?;
        }
        if state.total_bytes == Some(state.bytes_written) {
            tracing::debug!(destination = %state.destination.display(), "checkpoint covers the whole object");
            discard_checkpoint(&state.destination);
            return Ok(Box::new(CurlTransfer {
                url: state.url,
                destination: state.destination,
                shared: Arc::new(Shared::new(state.bytes_written, state.total_bytes, SUCCEEDED)),
                thread: None,
            }));
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&state.destination)?;
        self.spawn(
            state.url,
            state.destination,
            file,
            state.bytes_written,
            state.total_bytes,
        )
    }
}

/// Handle to a transfer running on its own thread.
struct CurlTransfer {
    url: String,
    destination: PathBuf,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Transfer for CurlTransfer {
    fn progress(&self) -> Option<f64> {
        self.shared.fraction()
    }

    fn is_done(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) != RUNNING
    }

    fn is_failed(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == FAILED
    }

    fn pause(mut self: Box<Self>) -> Result<Checkpoint, TransferError> {
        self.shared.abort.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.join().map_err(|_| TransferError::Panicked)?;
        }
        let state = ResumeState {
            url: self.url.clone(),
            destination: self.destination.clone(),
            bytes_written: self.shared.written.load(Ordering::Acquire),
            total_bytes: self.shared.total(),
        };
        tracing::debug!(
            destination = %state.destination.display(),
            bytes_written = state.bytes_written,
            "transfer paused"
        );
        let token = serde_json::to_vec(&state).map_err(|e| TransferError::Engine(e.to_string()))?;
        Ok(Checkpoint::new(token))
    }
}

impl Drop for CurlTransfer {
    fn drop(&mut self) {
        // Detach; the thread notices the flag at its next callback.
        if self.thread.is_some() {
            self.shared.abort.store(true, Ordering::Release);
        }
    }
}

fn run_transfer(
    url: &str,
    destination: &Path,
    file: File,
    offset: u64,
    options: TransferOptions,
    shared: &Shared,
) {
    let state = match perform(url, file, offset, options, shared) {
        Ok(()) => {
            if shared.total().is_none() {
                shared
                    .total
                    .store(shared.written.load(Ordering::Acquire), Ordering::Release);
            }
            discard_checkpoint(destination);
            tracing::info!(%url, destination = %destination.display(), "transfer complete");
            SUCCEEDED
        }
        Err(_) if shared.abort.load(Ordering::Acquire) => PAUSED,
        Err(e) => {
            tracing::warn!(%url, destination = %destination.display(), "transfer failed: {}", e);
            FAILED
        }
    };
    shared.state.store(state, Ordering::Release);
}

/// A fresh transfer accepts any 2xx; a resumed one needs 206 so the append lines up.
fn status_ok(code: u32, offset: u64) -> bool {
    if offset > 0 {
        code == 206
    } else {
        (200..300).contains(&code)
    }
}

fn perform(
    url: &str,
    mut file: File,
    offset: u64,
    options: TransferOptions,
    shared: &Shared,
) -> Result<(), TransferError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(options.connect_timeout)?;
    easy.low_speed_limit(options.low_speed_limit)?;
    easy.low_speed_time(options.low_speed_time)?;
    if let Some(speed) = options.max_recv_speed {
        easy.max_recv_speed(speed)?;
    }
    if offset > 0 {
        easy.range(&format!("{}-", offset))?;
    }
    easy.progress(true)?;

    let status = std::cell::Cell::new(0u32);
    let mut failure: Option<TransferError> = None;
    let perform_result = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(line) = std::str::from_utf8(data) {
                if line.starts_with("HTTP/") {
                    if let Some(code) = line.split_whitespace().nth(1).and_then(|c| c.parse().ok()) {
                        status.set(code);
                    }
                }
            }
            true
        })?;
        transfer.progress_function(|dltotal, _dlnow, _ultotal, _ulnow| {
            if dltotal > 0.0 && status_ok(status.get(), offset) {
                shared.total.store(offset + dltotal as u64, Ordering::Release);
            }
            !shared.abort.load(Ordering::Acquire)
        })?;
        transfer.write_function(|data| {
            if shared.abort.load(Ordering::Acquire) {
                return Ok(0);
            }
            let code = status.get();
            if !status_ok(code, offset) {
                failure = Some(TransferError::Http(code));
                return Ok(0);
            }
            match file.write_all(data) {
                Ok(()) => {
                    shared.written.fetch_add(data.len() as u64, Ordering::AcqRel);
                    Ok(data.len())
                }
                Err(e) => {
                    failure = Some(e.into());
                    Ok(0)
                }
            }
        })?;
        transfer.perform()
    };

    if let Some(e) = failure {
        return Err(e);
    }
    perform_result?;
    let code = easy.response_code()?;
    if !status_ok(code, offset) {
        return Err(TransferError::Http(code));
    }
    file.sync_all()?;
    Ok(())
}

/// Removes a consumed checkpoint once its transfer has finished.
fn discard_checkpoint(destination: &Path) {
    let path = paths::checkpoint_path(destination);
    match fs::remove_file(&path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed consumed checkpoint"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "could not remove checkpoint: {}", e),
    }
}
