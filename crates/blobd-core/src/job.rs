//! Job submission and status records exchanged over the bus.
//!
//! Wire form of a submission: `{"jobId": "...", "s3Bucket": "...", "key": "..."}`.
//! Status records: `{"jobId": "...", "status": "IN_PROGRESS", "reason": "0.5"}`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::paths;

/// Job identifier, unique across concurrently active jobs.
pub type JobId = String;

/// Where an object lives in the remote blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(rename = "s3Bucket")]
    pub bucket: String,
    pub key: String,
}

/// A decoded download request. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    #[serde(flatten)]
    pub source: SourceLocation,
}

/// Why an inbound job message was dropped.
#[derive(Debug, thiserror::Error)]
pub enum JobDecodeError {
    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed job document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("job id is empty")]
    EmptyJobId,
    #[error("invalid source location: {0}")]
    InvalidSource(String),
}

impl JobSpec {
    pub fn new(job_id: impl Into<JobId>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            source: SourceLocation {
                bucket: bucket.into(),
                key: key.into(),
            },
        }
    }

    /// Decodes and validates a raw submission payload.
    pub fn decode(raw: &[u8]) -> Result<Self, JobDecodeError> {
        let text = std::str::from_utf8(raw)?;
        let spec: JobSpec = serde_json::from_str(text)?;
        if spec.job_id.trim().is_empty() {
            return Err(JobDecodeError::EmptyJobId);
        }
        paths::validate_source(&spec.source)?;
        Ok(spec)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Job status as reported on the update topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason token sent with a cancelled job.
pub const REASON_PAUSED: &str = "paused";
/// Reason token sent with a completed job.
pub const REASON_DONE: &str = "done";
/// Reason token sent with a failed job.
pub const REASON_FAIL: &str = "fail";

/// One status record for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    pub status: JobStatus,
    pub reason: String,
}

impl StatusUpdate {
    /// Intermediate update; `reason` carries the fraction transferred (e.g. "0.5").
    pub fn progress(job_id: &str, fraction: f64) -> Self {
        Self::new(job_id, JobStatus::InProgress, format!("{:?}", fraction))
    }

    pub fn paused(job_id: &str) -> Self {
        Self::new(job_id, JobStatus::InProgress, REASON_PAUSED)
    }

    pub fn succeeded(job_id: &str) -> Self {
        Self::new(job_id, JobStatus::Succeeded, REASON_DONE)
    }

    pub fn failed(job_id: &str) -> Self {
        Self::new(job_id, JobStatus::Failed, REASON_FAIL)
    }

    fn new(job_id: &str, status: JobStatus, reason: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            reason: reason.into(),
        }
    }

    /// True for SUCCEEDED, FAILED and the paused IN_PROGRESS record.
    pub fn is_terminal(&self) -> bool {
        self.status != JobStatus::InProgress || self.reason == REASON_PAUSED
    }
}
