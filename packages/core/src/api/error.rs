//! Request Service Error Types

use thiserror::Error;

/// Errors returned by the authoritative request service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The server answered with a failure status
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The server could not be reached
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    /// No answer within the configured request timeout
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// The response body could not be decoded
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::rejected(404, format!("{} not found", what.into()))
    }

    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Message from the server, when it sent one
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { message, .. } if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}
