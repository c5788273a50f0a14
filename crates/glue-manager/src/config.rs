//! Stream driver configuration.

use std::time::Duration;

/// Configuration for a discovery stream driver.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// Deadline for enqueueing a response on the outbound channel. On
    /// expiry the transaction is discarded and the next notification
    /// resynchronizes the client.
    pub push_timeout: Duration,
    /// How often the driver sweeps its in-flight transactions.
    pub cleanup_interval: Duration,
    /// Age past which an unacknowledged transaction is retired.
    pub transaction_ttl: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            push_timeout: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(60),
            transaction_ttl: Duration::from_secs(60),
        }
    }
}
