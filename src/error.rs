//! Error taxonomy for the synchronization core
//!
//! None of these are fatal: the controller recovers all of them at its
//! boundary (reject locally, reconnect, or let the next poll self-correct).

use thiserror::Error;

use crate::channel::ChannelId;

/// Errors raised by the sync core and its collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Value outside the channel's inclusive bounds. Never reaches the transport.
    #[error("invalid value {value} for {channel} (allowed {min}..={max})")]
    InvalidChannelValue {
        channel: ChannelId,
        value: i32,
        min: i32,
        max: i32,
    },

    /// Device is disconnected or the read/write failed at the transport level.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Device refused a specific write.
    #[error("device rejected {channel}={value}: {reason}")]
    DeviceRejected {
        channel: ChannelId,
        value: i32,
        reason: String,
    },
}

impl SyncError {
    /// Shorthand for a `DeviceUnavailable` with a message
    pub fn unavailable(msg: impl Into<String>) -> Self {
        SyncError::DeviceUnavailable(msg.into())
    }

    /// True when the error means the connection is gone
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SyncError::DeviceUnavailable(_))
    }
}

/// Result alias for sync core operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;
