//! Authoritative Request Service
//!
//! Request/response operations against the collaboration server. The HTTP
//! implementation lives outside this crate; the sync engine only depends on
//! the [`CollabApi`] contract, and [`crate::loopback`] provides an in-process
//! implementation for tests and simulations.
//!
//! Credentials are carried by the implementation (browser clients rely
//! on cookies), so no operation takes a token.

mod error;

pub use error::ApiError;

use crate::models::{Board, JoinedTeam, Note, Team};
use async_trait::async_trait;

#[async_trait]
pub trait CollabApi: Send + Sync {
    /// `GET /boards/fetchByTeamId/:teamId`
    async fn fetch_boards(&self, team_id: &str) -> Result<Vec<Board>, ApiError>;

    /// `POST /boards`; the server broadcasts `board-created` to the team room
    async fn create_board(&self, team_id: &str, title: &str) -> Result<Board, ApiError>;

    /// `DELETE /boards/:boardId`
    async fn delete_board(&self, board_id: &str) -> Result<(), ApiError>;

    /// `POST /boards/:boardId/notes`; the server broadcasts `note-added`
    async fn add_note(&self, board_id: &str, content: &str) -> Result<Note, ApiError>;

    /// `DELETE /boards/:boardId/notes/:noteId`
    async fn delete_note(&self, board_id: &str, note_id: &str) -> Result<(), ApiError>;

    /// `PUT /boards/:boardId/notes/:noteId`
    async fn update_note(&self, board_id: &str, note_id: &str, content: &str) -> Result<Note, ApiError>;

    /// `GET /getMyTeams/:userId`
    async fn list_teams(&self, user_id: &str) -> Result<Vec<Team>, ApiError>;

    /// `POST /createTeam`
    async fn create_team(&self, name: &str) -> Result<Team, ApiError>;

    /// `POST /joinTeam`
    async fn join_team(&self, join_code: &str) -> Result<JoinedTeam, ApiError>;

    /// `DELETE /leaveTeam/:teamId`
    async fn leave_team(&self, team_id: &str) -> Result<(), ApiError>;
}
