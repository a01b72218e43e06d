//! Team View
//!
//! Everything the rendering layer reads for the active team: the board store,
//! the presence count and the id of the board whose note composer is open.
//!
//! UI references are held here as plain ids, never on the entities, so a
//! deleted board can be forgotten by clearing a single field.
//!
//! Each activation bumps an `epoch`. Work that suspends across a request
//! (the initial board fetch) records the epoch it started under and discards
//! its result if the view has moved on to another team in the meantime.

use crate::models::{Board, RoomId, Team};
use crate::services::presence::PresenceTracker;
use crate::store::BoardStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// View state shared between the mutation pipeline and the event reconciler
pub type SharedView = Arc<RwLock<TeamView>>;

#[derive(Debug, Default)]
pub struct TeamView {
    team: Option<Team>,
    room: Option<RoomId>,
    epoch: u64,
    revision: u64,
    store: BoardStore,
    presence: PresenceTracker,
    composing: Option<String>,
}

/// Read-only copy of the view handed to the rendering layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub team: Option<Team>,
    pub boards: Vec<Board>,
    pub online: u32,
    pub composing: Option<String>,
    pub revision: u64,
}

impl ViewSnapshot {
    pub fn board(&self, board_id: &str) -> Option<&Board> {
        self.boards.iter().find(|b| b.id == board_id)
    }
}

impl TeamView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedView {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Tear down the current team's state and start a fresh one for `team`.
    ///
    /// Returns the new epoch.
    pub fn activate(&mut self, team: Team) -> u64 {
        self.reset();
        self.room = Some(team.room());
        self.team = Some(team);
        self.epoch
    }

    /// Tear down the current team's state without activating another one
    pub fn deactivate(&mut self) -> u64 {
        self.reset();
        self.epoch
    }

    fn reset(&mut self) {
        self.store.clear();
        self.presence.reset();
        self.composing = None;
        self.team = None;
        self.room = None;
        self.epoch += 1;
        self.touch();
    }

    pub fn team(&self) -> Option<&Team> {
        self.team.as_ref()
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Monotonic counter bumped on every visible change
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn touch(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut BoardStore {
        &mut self.store
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub(crate) fn presence_mut(&mut self) -> &mut PresenceTracker {
        &mut self.presence
    }

    pub fn composing(&self) -> Option<&str> {
        self.composing.as_deref()
    }

    /// Open the note composer on a board. Only boards in the store qualify.
    pub fn open_composer(&mut self, board_id: &str) -> bool {
        if !self.store.contains_board(board_id) {
            return false;
        }
        self.composing = Some(board_id.to_string());
        true
    }

    pub fn close_composer(&mut self) -> bool {
        self.composing.take().is_some()
    }

    /// Close the composer if it is open on `board_id`
    pub(crate) fn forget_board(&mut self, board_id: &str) -> bool {
        if self.composing.as_deref() == Some(board_id) {
            self.composing = None;
            return true;
        }
        false
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            team: self.team.clone(),
            boards: self.store.boards().to_vec(),
            online: self.presence.count(),
            composing: self.composing.clone(),
            revision: self.revision,
        }
    }
}
