use std::time::Duration;

use thiserror::Error;

/// Failure of the live channel: it never opened, timed out while opening, or
/// closed underneath an open session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid channel address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("channel to {address} did not open within {}ms", timeout.as_millis())]
    Timeout { address: String, timeout: Duration },

    #[error("failed to open channel to {address}: {source}")]
    Open {
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("channel closed: {reason}")]
    Closed { reason: String },
}

impl ConnectionError {
    pub fn open(
        address: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Open {
            address: address.into(),
            source: source.into(),
        }
    }

    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: reason.into(),
        }
    }
}

/// Outcome of a fire-and-forget send on the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Handed to the channel writer. Delivery is not acknowledged.
    Sent,
    /// The channel is not open; the frame was dropped, not queued.
    NotConnected,
    /// The frame could not be encoded and was dropped.
    Rejected,
}

impl SendStatus {
    pub fn is_sent(self) -> bool {
        matches!(self, Self::Sent)
    }
}
