//! Per-transfer curl tuning.

use std::time::Duration;

/// Curl options applied to every transfer started by [`super::CurlEngine`].
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    pub connect_timeout: Duration,
    /// Abort when throughput stays below this many bytes/sec for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    /// Receive rate cap in bytes/sec (None = no cap).
    pub max_recv_speed: Option<u64>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            max_recv_speed: None,
        }
    }
}
