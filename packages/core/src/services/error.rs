//! Service Layer Error Types
//!
//! Errors returned by the sync client's operations. Request failures are also
//! surfaced as notifications before they are returned, so callers that only
//! render notifications can ignore the `Err` value.

use crate::api::ApiError;
use crate::channel::ChannelError;
use crate::models::ValidationError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// No session: the user has not signed in
    #[error("Not signed in")]
    NotSignedIn,

    /// The operation needs an active team
    #[error("No active team")]
    NoActiveTeam,

    /// User input failed validation before any request was issued
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// A board creation is already in flight
    #[error("A board is already being created")]
    CreateInProgress,

    #[error("Board not found: {board_id}")]
    BoardNotFound { board_id: String },

    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    /// The authoritative request failed
    #[error("Request failed: {0}")]
    Request(#[from] ApiError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl SyncError {
    pub fn board_not_found(board_id: impl Into<String>) -> Self {
        Self::BoardNotFound {
            board_id: board_id.into(),
        }
    }

    /// True for failures of the authoritative request (including timeouts)
    pub fn is_request_failure(&self) -> bool {
        matches!(self, SyncError::Request(_))
    }
}
