//! Transport that records every published message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use blobd_core::job::StatusUpdate;
use blobd_core::publisher::{Transport, TransportError};

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    reject: AtomicBool,
}

impl RecordingTransport {
    /// Makes every publish fail as unauthorized.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, payload)| serde_json::from_slice(payload).expect("status json"))
            .collect()
    }

    pub fn updates_for(&self, job_id: &str) -> Vec<StatusUpdate> {
        self.updates()
            .into_iter()
            .filter(|u| u.job_id == job_id)
            .collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

impl Transport for RecordingTransport {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(TransportError::Unauthorized(topic.to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}
