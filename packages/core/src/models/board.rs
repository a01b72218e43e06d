//! Board and Note Data Structures
//!
//! A `Board` is owned by a team and holds an ordered sequence of `Note`s.
//! Sequence order is insertion order unless the client reorders it locally.
//!
//! # Wire Format
//!
//! The collaboration server identifies records with `_id`; both `_id` and `id`
//! are accepted on input, `_id` is produced on output.
//!
//! ```rust
//! use teamboard_core::models::{Board, Note};
//!
//! let mut board = Board::new("b1", "Sprint goals", "t1");
//! board.notes.push(Note::new("n1", "Ship the sync engine", "b1"));
//! assert_eq!(board.note_index("n1"), Some(0));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for inbound or user-supplied entities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field '{0}' must not be blank")]
    BlankField(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}

impl ValidationError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    pub fn blank_field(field: impl Into<String>) -> Self {
        Self::BlankField(field.into())
    }
}

/// A single note on a board.
///
/// `board_id` is filled in by the store when the note is attached to a board,
/// so payloads that omit it still end up consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,

    #[serde(default)]
    pub content: String,

    /// Author's user id, when the server reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,

    #[serde(default)]
    pub board_id: String,
}

impl Note {
    pub fn new(id: impl Into<String>, content: impl Into<String>, board_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            author_id: None,
            board_id: board_id.into(),
        }
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::missing_field("note._id"));
        }
        Ok(())
    }
}

/// A team board with its ordered notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, alias = "team")]
    pub team_id: String,

    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Board {
    pub fn new(id: impl Into<String>, title: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            team_id: team_id.into(),
            notes: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::missing_field("board._id"));
        }
        self.notes.iter().try_for_each(Note::validate)
    }

    /// Position of the note with `note_id`, if present
    pub fn note_index(&self, note_id: &str) -> Option<usize> {
        self.notes.iter().position(|n| n.id == note_id)
    }

    pub fn contains_note(&self, note_id: &str) -> bool {
        self.note_index(note_id).is_some()
    }

    pub fn note(&self, note_id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == note_id)
    }
}
