//! In-Process Collaboration Server
//!
//! A small authoritative server that lives in the same process as its
//! clients. It implements both seams the sync engine consumes:
//!
//! - [`CollabApi`]: teams, boards and notes kept in memory, with server-assigned
//!   uuid ids and per-team membership checks
//! - [`PushChannel`]: one broadcast fan-out shared by every connection, with
//!   per-connection room tracking and `team-users-count` presence updates
//!
//! Mutations are broadcast to the team's room in the same payload shapes the
//! production server uses (`board-created` as a flat board with `createdBy`,
//! `note-added` with the author under `note.user`, ...), so everything goes
//! through the same parsing path as real traffic.
//!
//! # Fault Injection
//!
//! [`LoopbackServer::fail_next`] makes the next call of one operation fail
//! with a given error, [`LoopbackServer::set_latency`] delays every request,
//! [`LoopbackServer::hold_events`] queues broadcasts until released, and
//! [`LoopbackServer::shutdown_channel`] closes every open subscription.
//!
//! ```rust
//! use std::sync::Arc;
//! use teamboard_core::loopback::LoopbackServer;
//! use teamboard_core::models::SessionUser;
//!
//! let server = LoopbackServer::new(64);
//! let jane = Arc::new(server.connect(SessionUser::new("u1", "jane@example.com", "")));
//! assert_eq!(jane.user().display_name, "Jane");
//! ```

use crate::api::{ApiError, CollabApi};
use crate::channel::{ChannelEnvelope, ChannelError, JoinRoom, PushChannel, RoomSubscription};
use crate::events::names;
use crate::models::{Board, JoinedTeam, Note, RoomId, SessionUser, Team};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Server operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchBoards,
    CreateBoard,
    DeleteBoard,
    AddNote,
    DeleteNote,
    UpdateNote,
    ListTeams,
    CreateTeam,
    JoinTeam,
    LeaveTeam,
}

#[derive(Debug)]
struct TeamRecord {
    team: Team,
    members: HashSet<String>,
}

#[derive(Debug, Default)]
struct ServerState {
    teams: Vec<TeamRecord>,
    boards: Vec<Board>,
    /// connection id -> joined room
    rooms: HashMap<String, RoomId>,
    failures: HashMap<Operation, VecDeque<ApiError>>,
    latency: Option<Duration>,
    held: Option<Vec<ChannelEnvelope>>,
    channel: Option<broadcast::Sender<ChannelEnvelope>>,
}

impl ServerState {
    fn team(&self, team_id: &str) -> Option<&TeamRecord> {
        self.teams.iter().find(|t| t.team.id == team_id)
    }

    fn board_mut(&mut self, board_id: &str) -> Option<&mut Board> {
        self.boards.iter_mut().find(|b| b.id == board_id)
    }

    fn is_member(&self, team_id: &str, user_id: &str) -> bool {
        self.team(team_id)
            .is_some_and(|t| t.members.contains(user_id))
    }

    fn require_member(&self, team_id: &str, user_id: &str) -> Result<(), ApiError> {
        if self.team(team_id).is_none() {
            return Err(ApiError::not_found("Team"));
        }
        if !self.is_member(team_id, user_id) {
            return Err(ApiError::rejected(403, "Not a member of this team"));
        }
        Ok(())
    }

    fn take_failure(&mut self, operation: Operation) -> Result<(), ApiError> {
        match self.failures.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn online(&self, room: &RoomId) -> usize {
        self.rooms.values().filter(|r| *r == room).count()
    }

    fn publish(&mut self, envelope: ChannelEnvelope) {
        if let Some(held) = self.held.as_mut() {
            held.push(envelope);
            return;
        }
        if let Some(tx) = &self.channel {
            debug!("Loopback broadcast '{}' to {}", envelope.event, envelope.room);
            let _ = tx.send(envelope);
        }
    }

    fn publish_presence(&mut self, room: &RoomId) {
        let count = self.online(room);
        self.publish(ChannelEnvelope::new(
            room.clone(),
            names::TEAM_USERS_COUNT,
            json!(count),
        ));
    }
}

/// Shared in-memory server. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LoopbackServer {
    state: Arc<Mutex<ServerState>>,
}

impl LoopbackServer {
    pub fn new(event_buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(event_buffer.max(1));
        let state = ServerState {
            channel: Some(tx),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a connection for `user`. The connection is both the user's
    /// request client and their push channel.
    pub fn connect(&self, user: SessionUser) -> LoopbackConnection {
        LoopbackConnection {
            server: self.clone(),
            user,
            connection_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a team directly, with `members` already joined
    pub fn seed_team(&self, name: &str, members: &[&str]) -> Team {
        let team = Team::new(new_id(), name, new_join_code());
        self.state().teams.push(TeamRecord {
            team: team.clone(),
            members: members.iter().map(|m| m.to_string()).collect(),
        });
        team
    }

    /// Create a board directly, without broadcasting
    pub fn seed_board(&self, team_id: &str, title: &str, notes: &[&str]) -> Board {
        let mut board = Board::new(new_id(), title, team_id);
        for content in notes {
            board.notes.push(Note::new(new_id(), *content, board.id.clone()));
        }
        self.state().boards.push(board.clone());
        board
    }

    pub fn boards(&self, team_id: &str) -> Vec<Board> {
        self.state()
            .boards
            .iter()
            .filter(|b| b.team_id == team_id)
            .cloned()
            .collect()
    }

    /// Broadcast an arbitrary event to a room
    pub fn publish(&self, room: RoomId, event: &str, payload: Value) {
        self.state().publish(ChannelEnvelope::new(room, event, payload));
    }

    /// Number of connections currently in `room`
    pub fn online(&self, room: &RoomId) -> usize {
        self.state().online(room)
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: Operation, error: ApiError) {
        self.state()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Delay every request by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    /// Queue broadcasts instead of sending them
    pub fn hold_events(&self) {
        let mut state = self.state();
        if state.held.is_none() {
            state.held = Some(Vec::new());
        }
    }

    /// Stop holding and return the queued broadcasts without sending them
    pub fn take_held_events(&self) -> Vec<ChannelEnvelope> {
        self.state().held.take().unwrap_or_default()
    }

    /// Stop holding and send the queued broadcasts in the given order
    pub fn release_events(&self, events: Vec<ChannelEnvelope>) {
        let mut state = self.state();
        state.held = None;
        for envelope in events {
            state.publish(envelope);
        }
    }

    /// Close the push channel; every open subscription ends
    pub fn shutdown_channel(&self) {
        let mut state = self.state();
        state.channel = None;
        state.rooms.clear();
    }

    async fn begin(&self, operation: Operation) -> Result<(), ApiError> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.state().take_failure(operation)
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn new_join_code() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}", &id[..4], &id[4..8])
}

/// One user's connection to the [`LoopbackServer`]
#[derive(Debug)]
pub struct LoopbackConnection {
    server: LoopbackServer,
    user: SessionUser,
    connection_id: String,
}

impl LoopbackConnection {
    pub fn user(&self) -> &SessionUser {
        &self.user
    }

    pub fn server(&self) -> &LoopbackServer {
        &self.server
    }

    fn author(&self) -> Value {
        json!({
            "_id": self.user.user_id,
            "name": self.user.display_name,
            "email": self.user.email,
        })
    }

    /// Drop this connection's room membership, as a socket disconnect would
    pub fn disconnect(&self) {
        let mut state = self.server.state();
        if let Some(room) = state.rooms.remove(&self.connection_id) {
            state.publish_presence(&room);
        }
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[async_trait]
impl CollabApi for LoopbackConnection {
    async fn fetch_boards(&self, team_id: &str) -> Result<Vec<Board>, ApiError> {
        self.server.begin(Operation::FetchBoards).await?;
        let state = self.server.state();
        state.require_member(team_id, &self.user.user_id)?;
        Ok(state
            .boards
            .iter()
            .filter(|b| b.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn create_board(&self, team_id: &str, title: &str) -> Result<Board, ApiError> {
        self.server.begin(Operation::CreateBoard).await?;
        let mut state = self.server.state();
        state.require_member(team_id, &self.user.user_id)?;

        let board = Board::new(new_id(), title, team_id);
        state.boards.push(board.clone());

        let mut payload = serde_json::to_value(&board).map_err(|e| ApiError::decode(e.to_string()))?;
        if let Value::Object(fields) = &mut payload {
            fields.insert("createdBy".to_string(), self.author());
        }
        state.publish(ChannelEnvelope::new(
            RoomId::for_team(team_id),
            names::BOARD_CREATED,
            payload,
        ));
        Ok(board)
    }

    async fn delete_board(&self, board_id: &str) -> Result<(), ApiError> {
        self.server.begin(Operation::DeleteBoard).await?;
        let mut state = self.server.state();
        let team_id = state
            .boards
            .iter()
            .find(|b| b.id == board_id)
            .map(|b| b.team_id.clone())
            .ok_or_else(|| ApiError::not_found("Board"))?;
        state.require_member(&team_id, &self.user.user_id)?;

        state.boards.retain(|b| b.id != board_id);
        let payload = json!({"boardId": board_id, "deletedBy": self.author()});
        state.publish(ChannelEnvelope::new(
            RoomId::for_team(&team_id),
            names::BOARD_DELETED,
            payload,
        ));
        Ok(())
    }

    async fn add_note(&self, board_id: &str, content: &str) -> Result<Note, ApiError> {
        self.server.begin(Operation::AddNote).await?;
        let mut state = self.server.state();
        let team_id = state
            .boards
            .iter()
            .find(|b| b.id == board_id)
            .map(|b| b.team_id.clone())
            .ok_or_else(|| ApiError::not_found("Board"))?;
        state.require_member(&team_id, &self.user.user_id)?;

        let note = Note::new(new_id(), content, board_id).with_author(self.user.user_id.clone());
        if let Some(board) = state.board_mut(board_id) {
            board.notes.push(note.clone());
        }

        let payload = json!({
            "boardId": board_id,
            "note": {
                "_id": note.id,
                "content": note.content,
                "user": self.author(),
            },
        });
        state.publish(ChannelEnvelope::new(
            RoomId::for_team(&team_id),
            names::NOTE_ADDED,
            payload,
        ));
        Ok(note)
    }

    async fn delete_note(&self, board_id: &str, note_id: &str) -> Result<(), ApiError> {
        self.server.begin(Operation::DeleteNote).await?;
        let mut state = self.server.state();
        let team_id = state
            .boards
            .iter()
            .find(|b| b.id == board_id)
            .map(|b| b.team_id.clone())
            .ok_or_else(|| ApiError::not_found("Board"))?;
        state.require_member(&team_id, &self.user.user_id)?;

        let board = state
            .board_mut(board_id)
            .ok_or_else(|| ApiError::not_found("Board"))?;
        let index = board
            .note_index(note_id)
            .ok_or_else(|| ApiError::not_found("Note"))?;
        board.notes.remove(index);

        let payload = json!({"boardId": board_id, "noteId": note_id, "deletedBy": self.author()});
        state.publish(ChannelEnvelope::new(
            RoomId::for_team(&team_id),
            names::NOTE_DELETED,
            payload,
        ));
        Ok(())
    }

    async fn update_note(&self, board_id: &str, note_id: &str, content: &str) -> Result<Note, ApiError> {
        self.server.begin(Operation::UpdateNote).await?;
        let mut state = self.server.state();
        let team_id = state
            .boards
            .iter()
            .find(|b| b.id == board_id)
            .map(|b| b.team_id.clone())
            .ok_or_else(|| ApiError::not_found("Board"))?;
        state.require_member(&team_id, &self.user.user_id)?;

        let note = state
            .board_mut(board_id)
            .and_then(|b| b.notes.iter_mut().find(|n| n.id == note_id))
            .ok_or_else(|| ApiError::not_found("Note"))?;
        note.content = content.to_string();
        Ok(note.clone())
    }

    async fn list_teams(&self, user_id: &str) -> Result<Vec<Team>, ApiError> {
        self.server.begin(Operation::ListTeams).await?;
        let state = self.server.state();
        Ok(state
            .teams
            .iter()
            .filter(|t| t.members.contains(user_id))
            .map(|t| t.team.clone())
            .collect())
    }

    async fn create_team(&self, name: &str) -> Result<Team, ApiError> {
        self.server.begin(Operation::CreateTeam).await?;
        let team = Team::new(new_id(), name, new_join_code());
        self.server.state().teams.push(TeamRecord {
            team: team.clone(),
            members: HashSet::from([self.user.user_id.clone()]),
        });
        Ok(team)
    }

    async fn join_team(&self, join_code: &str) -> Result<JoinedTeam, ApiError> {
        self.server.begin(Operation::JoinTeam).await?;
        let mut state = self.server.state();
        let record = state
            .teams
            .iter_mut()
            .find(|t| t.team.join_code.eq_ignore_ascii_case(join_code))
            .ok_or_else(|| ApiError::rejected(400, "Invalid Join Code"))?;
        record.members.insert(self.user.user_id.clone());
        let team = record.team.clone();

        let boards = state
            .boards
            .iter()
            .filter(|b| b.team_id == team.id)
            .cloned()
            .collect();
        Ok(JoinedTeam { team, boards })
    }

    async fn leave_team(&self, team_id: &str) -> Result<(), ApiError> {
        self.server.begin(Operation::LeaveTeam).await?;
        let mut state = self.server.state();
        state.require_member(team_id, &self.user.user_id)?;
        if let Some(record) = state.teams.iter_mut().find(|t| t.team.id == team_id) {
            record.members.remove(&self.user.user_id);
        }
        Ok(())
    }
}

#[async_trait]
impl PushChannel for LoopbackConnection {
    async fn join_room(&self, join: JoinRoom) -> Result<RoomSubscription, ChannelError> {
        let mut state = self.server.state();
        let room = join.room().clone();

        if let Some(team_id) = room.team_id() {
            if !state.is_member(team_id, &join.user.id) {
                return Err(ChannelError::join_rejected(
                    room.as_str(),
                    "not a member of this team",
                ));
            }
        }
        let receiver = state
            .channel
            .as_ref()
            .map(|tx| tx.subscribe())
            .ok_or_else(|| ChannelError::disconnected("loopback channel is shut down"))?;

        let previous = state.rooms.insert(self.connection_id.clone(), room.clone());
        if let Some(previous) = previous.filter(|p| *p != room) {
            state.publish_presence(&previous);
        }
        state.publish_presence(&room);

        Ok(RoomSubscription::new(room, receiver))
    }
}
