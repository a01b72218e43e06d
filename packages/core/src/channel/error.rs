//! Push Channel Error Types

use thiserror::Error;

/// Errors raised by a push-event channel implementation
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The connection is down; callers treat this as transient
    #[error("Channel disconnected: {0}")]
    Disconnected(String),

    /// The server refused the join-room signal
    #[error("Join rejected for room {room}: {reason}")]
    JoinRejected { room: String, reason: String },

    #[error("Failed to encode channel message: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChannelError {
    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::Disconnected(msg.into())
    }

    pub fn join_rejected(room: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::JoinRejected {
            room: room.into(),
            reason: reason.into(),
        }
    }
}
