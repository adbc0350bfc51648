//! Status publishing over the messaging transport.

use std::sync::Arc;

use crate::job::StatusUpdate;

/// Error publishing a message to the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not authorized to publish to {0}")]
    Unauthorized(String),
    #[error("transport closed")]
    Closed,
    #[error("encode status update: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// Outbound side of the messaging transport: publish a payload to a named topic.
pub trait Transport: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;
}

/// Emits [`StatusUpdate`] records as JSON to the job-update topic.
#[derive(Clone)]
pub struct StatusPublisher {
    transport: Arc<dyn Transport>,
    topic: String,
}

impl StatusPublisher {
    pub fn new(transport: Arc<dyn Transport>, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn try_publish(&self, update: &StatusUpdate) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(update)?;
        self.transport.publish(&self.topic, &payload)
    }

    /// Publishes once; failures are logged and dropped (no retry, job unaffected).
    pub fn publish(&self, update: &StatusUpdate) {
        match self.try_publish(update) {
            Ok(()) => tracing::debug!(
                job_id = %update.job_id,
                status = %update.status,
                reason = %update.reason,
                topic = %self.topic,
                "published status"
            ),
            Err(e) => tracing::warn!(
                job_id = %update.job_id,
                status = %update.status,
                topic = %self.topic,
                "status publish failed: {}",
                e
            ),
        }
    }
}

impl std::fmt::Debug for StatusPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPublisher")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
