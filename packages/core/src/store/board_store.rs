//! Local Board Store
//!
//! In-memory source of truth for the active team's boards and notes. Every
//! read for rendering comes from here, and every write goes through the
//! idempotent-by-id operations below:
//!
//! - inserting a board or note whose id is already present is a no-op
//! - removing an id that is not present is a no-op
//! - a note is only ever attached to a board that is present
//!
//! # Tombstones
//!
//! The transport does not order events, so a delete can overtake the insert it
//! refers to. Removals record the id in a tombstone set and later inserts of a
//! tombstoned id are refused, which makes delete win regardless of arrival
//! order. The same applies to `merge_snapshot()`: a fetched list can be older
//! than a delete that landed while the fetch was in flight, so tombstoned
//! boards and notes are left out of the merge.
//!
//! Tombstones live as long as the store; `clear()` drops them together with
//! the boards. Note tombstones are dropped when their board is removed. Board
//! tombstones are kept until `clear()`, so a view held open for a very long
//! session grows by one id per deleted board.

use crate::models::{Board, Note};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Result of an insert attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The entity was appended
    Inserted,
    /// An entity with the same id already exists; nothing changed
    Duplicate,
    /// The id was removed earlier in this view; nothing changed
    Tombstoned,
    /// The note's board is not in the store; nothing changed
    UnknownBoard,
}

impl InsertOutcome {
    pub fn applied(self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

/// Result of a removal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Absent,
}

impl RemoveOutcome {
    pub fn applied(self) -> bool {
        matches!(self, RemoveOutcome::Removed)
    }
}

/// Errors for the local-only store operations that take positions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Board not found: {board_id}")]
    BoardNotFound { board_id: String },

    #[error("Reorder out of range: from {from} to {to} with {len} items")]
    IndexOutOfRange { from: usize, to: usize, len: usize },
}

impl StoreError {
    pub fn board_not_found(board_id: impl Into<String>) -> Self {
        Self::BoardNotFound {
            board_id: board_id.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoardStore {
    boards: Vec<Board>,
    removed_boards: HashSet<String>,
    /// note id -> id of the board it was removed from
    removed_notes: HashMap<String, String>,
}

impl BoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    pub fn board(&self, board_id: &str) -> Option<&Board> {
        self.boards.iter().find(|b| b.id == board_id)
    }

    pub fn contains_board(&self, board_id: &str) -> bool {
        self.board(board_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    fn board_mut(&mut self, board_id: &str) -> Option<&mut Board> {
        self.boards.iter_mut().find(|b| b.id == board_id)
    }

    /// Append a board unless its id is present or was removed in this view.
    ///
    /// Notes carried by the board are de-duplicated by id and stamped with the
    /// board's id; tombstoned notes are dropped.
    pub fn insert_board(&mut self, board: Board) -> InsertOutcome {
        if self.contains_board(&board.id) {
            return InsertOutcome::Duplicate;
        }
        if self.removed_boards.contains(&board.id) {
            return InsertOutcome::Tombstoned;
        }

        let board = normalize_board(board, Some(&self.removed_notes));
        self.boards.push(board);
        InsertOutcome::Inserted
    }

    pub fn remove_board(&mut self, board_id: &str) -> RemoveOutcome {
        self.removed_boards.insert(board_id.to_string());
        self.removed_notes.retain(|_, board| board != board_id);

        let before = self.boards.len();
        self.boards.retain(|b| b.id != board_id);
        if self.boards.len() < before {
            RemoveOutcome::Removed
        } else {
            RemoveOutcome::Absent
        }
    }

    /// Append a note to `board_id` unless the board is missing or the note id
    /// is already present (or tombstoned).
    pub fn insert_note(&mut self, board_id: &str, mut note: Note) -> InsertOutcome {
        if self.removed_notes.contains_key(&note.id) {
            return InsertOutcome::Tombstoned;
        }
        let Some(board) = self.board_mut(board_id) else {
            return InsertOutcome::UnknownBoard;
        };
        if board.contains_note(&note.id) {
            return InsertOutcome::Duplicate;
        }

        note.board_id = board.id.clone();
        board.notes.push(note);
        InsertOutcome::Inserted
    }

    /// Remove a note. The note id is tombstoned even when nothing was removed,
    /// so an insert arriving after its delete is still refused.
    pub fn remove_note(&mut self, board_id: &str, note_id: &str) -> RemoveOutcome {
        if !self.removed_boards.contains(board_id) {
            self.removed_notes
                .insert(note_id.to_string(), board_id.to_string());
        }

        let Some(board) = self.board_mut(board_id) else {
            return RemoveOutcome::Absent;
        };
        match board.note_index(note_id) {
            Some(index) => {
                board.notes.remove(index);
                RemoveOutcome::Removed
            }
            None => RemoveOutcome::Absent,
        }
    }

    /// Overwrite an existing note's content. Returns false if it is gone.
    pub fn update_note_content(&mut self, board_id: &str, note_id: &str, content: &str) -> bool {
        let Some(note) = self
            .board_mut(board_id)
            .and_then(|b| b.notes.iter_mut().find(|n| n.id == note_id))
        else {
            return false;
        };
        if note.content == content {
            return false;
        }
        note.content = content.to_string();
        true
    }

    /// Move the note at `from` to `to` within one board. Local only.
    pub fn reorder_notes(&mut self, board_id: &str, from: usize, to: usize) -> Result<bool, StoreError> {
        let board = self
            .board_mut(board_id)
            .ok_or_else(|| StoreError::board_not_found(board_id))?;
        move_item(&mut board.notes, from, to)
    }

    /// Move the board at `from` to `to`. Local only.
    pub fn reorder_boards(&mut self, from: usize, to: usize) -> Result<bool, StoreError> {
        move_item(&mut self.boards, from, to)
    }

    /// Merge an authoritative board list fetched from the server.
    ///
    /// Fetched boards come first in server order; boards the reconciler
    /// inserted meanwhile that the snapshot does not know about are kept after
    /// them. Boards and notes removed since the view was activated stay out.
    pub fn merge_snapshot(&mut self, snapshot: Vec<Board>) {
        let mut merged: Vec<Board> = Vec::with_capacity(snapshot.len() + self.boards.len());
        for board in snapshot {
            if self.removed_boards.contains(&board.id) || merged.iter().any(|b| b.id == board.id) {
                continue;
            }
            merged.push(normalize_board(board, Some(&self.removed_notes)));
        }

        for board in self.boards.drain(..) {
            if !merged.iter().any(|b| b.id == board.id) {
                merged.push(board);
            }
        }
        self.boards = merged;
    }

    /// Drop all boards and tombstones
    pub fn clear(&mut self) {
        self.boards.clear();
        self.removed_boards.clear();
        self.removed_notes.clear();
    }
}

fn normalize_board(mut board: Board, removed_notes: Option<&HashMap<String, String>>) -> Board {
    let mut seen = HashSet::new();
    let board_id = board.id.clone();
    board.notes.retain(|n| {
        let tombstoned = removed_notes.is_some_and(|removed| removed.contains_key(&n.id));
        !tombstoned && seen.insert(n.id.clone())
    });
    for note in &mut board.notes {
        note.board_id = board_id.clone();
    }
    board
}

fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> Result<bool, StoreError> {
    let len = items.len();
    if from >= len || to >= len {
        return Err(StoreError::IndexOutOfRange { from, to, len });
    }
    if from == to {
        return Ok(false);
    }
    let item = items.remove(from);
    items.insert(to, item);
    Ok(true)
}
