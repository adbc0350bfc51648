//! Resumable-transfer tokens and their on-disk form.
//!
//! The token bytes belong to the transfer engine; this module only moves them
//! to and from `<destination>.resume-download`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Error reading a checkpoint file back.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("checkpoint {0} is empty")]
    Empty(PathBuf),
}

/// Opaque, engine-defined token that captures enough state to resume a paused transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    token: Vec<u8>,
}

impl Checkpoint {
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.token
    }

    /// Writes the token to `path`, replacing any previous checkpoint atomically.
    pub fn persist(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&self.token)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)
    }

    /// Reads a checkpoint previously written by [`Checkpoint::persist`].
    pub fn load_from(path: &Path) -> Result<Self, CheckpointError> {
        let token = fs::read(path).map_err(|source| CheckpointError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if token.is_empty() {
            return Err(CheckpointError::Empty(path.to_path_buf()));
        }
        Ok(Self { token })
    }
}
