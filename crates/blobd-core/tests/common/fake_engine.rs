//! Scripted transfer engine that counts start/resume/pause calls.
//!
//! Checkpoint tokens are `fake:<bytes>`; anything else is treated as corrupt.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use blobd_core::checkpoint::Checkpoint;
use blobd_core::job::SourceLocation;
use blobd_core::transfer::{Transfer, TransferEngine, TransferError};

/// What new transfers do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run until paused or finished by the test.
    Hold,
    /// Report success on the first poll.
    Succeed,
    /// Report failure on the first poll.
    Fail,
    /// `start` itself returns an error.
    StartError,
}

#[derive(Debug, Default)]
struct Control {
    /// 0 running, 1 succeeded, 2 failed.
    state: AtomicUsize,
}

pub struct FakeEngine {
    mode: Mutex<Mode>,
    progress: Mutex<Option<f64>>,
    starts: AtomicUsize,
    resumes: AtomicUsize,
    pauses: Arc<AtomicUsize>,
    started: Mutex<Vec<PathBuf>>,
    live: Mutex<Vec<Arc<Control>>>,
}

impl FakeEngine {
    pub fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            progress: Mutex::new(Some(0.5)),
            starts: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
            pauses: Arc::new(AtomicUsize::new(0)),
            started: Mutex::new(Vec::new()),
            live: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_progress(&self, progress: Option<f64>) {
        *self.progress.lock().unwrap() = progress;
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    /// Destinations passed to `start`, in call order.
    pub fn started_destinations(&self) -> Vec<PathBuf> {
        self.started.lock().unwrap().clone()
    }

    /// Completes every held transfer with the given result.
    pub fn finish_all(&self, success: bool) {
        for control in self.live.lock().unwrap().iter() {
            control
                .state
                .store(if success { 1 } else { 2 }, Ordering::SeqCst);
        }
    }

    fn transfer(&self) -> Result<Box<dyn Transfer>, TransferError> {
        let mode = *self.mode.lock().unwrap();
        let control = Arc::new(Control::default());
        match mode {
            Mode::Hold | Mode::StartError => {}
            Mode::Succeed => control.state.store(1, Ordering::SeqCst),
            Mode::Fail => control.state.store(2, Ordering::SeqCst),
        }
        self.live.lock().unwrap().push(Arc::clone(&control));
        Ok(Box::new(FakeTransfer {
            control,
            progress: *self.progress.lock().unwrap(),
            pauses: Arc::clone(&self.pauses),
        }))
    }
}

impl TransferEngine for FakeEngine {
    fn start(
        &self,
        _source: &SourceLocation,
        destination: &Path,
    ) -> Result<Box<dyn Transfer>, TransferError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.started.lock().unwrap().push(destination.to_path_buf());
        if *self.mode.lock().unwrap() == Mode::StartError {
            return Err(TransferError::Engine("object not found".to_string()));
        }
        self.transfer()
    }

    fn resume(&self, checkpoint: &Checkpoint) -> Result<Box<dyn Transfer>, TransferError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        if !checkpoint.as_bytes().starts_with(b"fake:") {
            return Err(TransferError::CorruptCheckpoint("bad token".to_string()));
        }
        self.transfer()
    }
}

struct FakeTransfer {
    control: Arc<Control>,
    progress: Option<f64>,
    pauses: Arc<AtomicUsize>,
}

impl Transfer for FakeTransfer {
    fn progress(&self) -> Option<f64> {
        self.progress
    }

    fn is_done(&self) -> bool {
        self.control.state.load(Ordering::SeqCst) != 0
    }

    fn is_failed(&self) -> bool {
        self.control.state.load(Ordering::SeqCst) == 2
    }

    fn pause(self: Box<Self>) -> Result<Checkpoint, TransferError> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(Checkpoint::new("fake:1024"))
    }
}
