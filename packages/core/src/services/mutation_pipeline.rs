//! Mutation Pipeline
//!
//! Turns user intents into authoritative requests and applies local effects
//! according to a fixed optimism policy:
//!
//! | Intent | Before the request | On success | On failure |
//! |---|---|---|---|
//! | create board | nothing | board arrives via `board-created` | notify, nothing to undo |
//! | delete board | removed locally | nothing | notify, **no rollback** |
//! | add note | composer closed | note arrives via `note-added` | notify, nothing to undo |
//! | delete note | removed locally | nothing | notify, **no rollback** |
//! | edit note | nothing | content replaced if still present | notify |
//! | reorder notes / boards | moved locally | no request | n/a |
//!
//! Creates never insert the returned entity: the server echoes the change to
//! the room, and the reconciler is the single path by which new entities
//! enter the store. A failed delete leaves the optimistic removal in place;
//! the next fetch after a team switch brings the entity back.
//!
//! Every request is bounded by the configured timeout and a timeout is
//! handled like any other request failure. Nothing is retried.

use crate::api::{ApiError, CollabApi};
use crate::models::{Board, Note, ValidationError};
use crate::services::error::SyncError;
use crate::services::notification::{EventBus, Notification};
use crate::store::SharedView;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Run a request, mapping expiry of `timeout` to [`ApiError::Timeout`]
pub(crate) async fn with_timeout<T, F>(timeout: Duration, request: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Clears the in-flight create flag when the create finishes or is dropped
struct CreateGuard<'a>(&'a AtomicBool);

impl Drop for CreateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::blank_field(field));
    }
    Ok(())
}

pub struct MutationPipeline<A: CollabApi> {
    api: Arc<A>,
    view: SharedView,
    bus: EventBus,
    request_timeout: Duration,
    creating: AtomicBool,
}

impl<A: CollabApi> MutationPipeline<A> {
    pub fn new(api: Arc<A>, view: SharedView, bus: EventBus, request_timeout: Duration) -> Self {
        Self {
            api,
            view,
            bus,
            request_timeout,
            creating: AtomicBool::new(false),
        }
    }

    /// True while a board creation request is outstanding
    pub fn is_creating(&self) -> bool {
        self.creating.load(Ordering::Acquire)
    }

    async fn active_team_id(&self) -> Result<String, SyncError> {
        self.view
            .read()
            .await
            .team()
            .map(|t| t.id.clone())
            .ok_or(SyncError::NoActiveTeam)
    }

    fn fail(&self, message: &str, error: ApiError) -> SyncError {
        warn!("{}: {}", message, error);
        self.bus.notify(Notification::error(message));
        SyncError::Request(error)
    }

    /// Create a board in the active team.
    ///
    /// The store is left untouched; the board appears once the server's
    /// `board-created` broadcast reaches this client.
    pub async fn create_board(&self, title: &str) -> Result<Board, SyncError> {
        require_text("title", title)?;
        let team_id = self.active_team_id().await?;

        if self
            .creating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::CreateInProgress);
        }
        let _guard = CreateGuard(&self.creating);

        let title = title.trim();
        match with_timeout(self.request_timeout, self.api.create_board(&team_id, title)).await {
            Ok(board) => {
                debug!("Board {} created, awaiting broadcast", board.id);
                self.bus.notify(Notification::success("Board created!"));
                Ok(board)
            }
            Err(e) => Err(self.fail("Failed to create board", e)),
        }
    }

    /// Remove a board locally, then ask the server to delete it.
    pub async fn delete_board(&self, board_id: &str) -> Result<(), SyncError> {
        let revision = {
            let mut view = self.view.write().await;
            if view.team().is_none() {
                return Err(SyncError::NoActiveTeam);
            }
            let removed = view.store_mut().remove_board(board_id).applied();
            let composer_closed = view.forget_board(board_id);
            (removed || composer_closed).then(|| view.touch())
        };
        if let Some(revision) = revision {
            self.bus.view_changed(revision);
        }

        with_timeout(self.request_timeout, self.api.delete_board(board_id))
            .await
            .map_err(|e| self.fail("Failed to delete board", e))
    }

    /// Ask the server to add a note. The note is not inserted locally; it
    /// arrives via the `note-added` broadcast.
    pub async fn add_note(&self, board_id: &str, content: &str) -> Result<Note, SyncError> {
        require_text("content", content)?;

        let revision = {
            let mut view = self.view.write().await;
            if view.team().is_none() {
                return Err(SyncError::NoActiveTeam);
            }
            if !view.store().contains_board(board_id) {
                return Err(SyncError::board_not_found(board_id));
            }
            view.close_composer().then(|| view.touch())
        };
        if let Some(revision) = revision {
            self.bus.view_changed(revision);
        }

        with_timeout(self.request_timeout, self.api.add_note(board_id, content))
            .await
            .map_err(|e| self.fail("Failed to add note", e))
    }

    /// Remove a note locally, then ask the server to delete it.
    pub async fn delete_note(&self, board_id: &str, note_id: &str) -> Result<(), SyncError> {
        let revision = {
            let mut view = self.view.write().await;
            if view.team().is_none() {
                return Err(SyncError::NoActiveTeam);
            }
            view.store_mut()
                .remove_note(board_id, note_id)
                .applied()
                .then(|| view.touch())
        };
        if let Some(revision) = revision {
            self.bus.view_changed(revision);
        }

        with_timeout(self.request_timeout, self.api.delete_note(board_id, note_id))
            .await
            .map_err(|e| self.fail("Failed to delete note", e))
    }

    /// Update a note's content on the server, then apply the stored result.
    ///
    /// The local note is changed only after the server confirms, and only if
    /// it is still present in the same team view.
    pub async fn edit_note(&self, board_id: &str, note_id: &str, content: &str) -> Result<Note, SyncError> {
        require_text("content", content)?;

        let epoch = {
            let view = self.view.read().await;
            if view.team().is_none() {
                return Err(SyncError::NoActiveTeam);
            }
            view.epoch()
        };

        let note = with_timeout(
            self.request_timeout,
            self.api.update_note(board_id, note_id, content),
        )
        .await
        .map_err(|e| self.fail("Failed to update note", e))?;

        let revision = {
            let mut view = self.view.write().await;
            if !view.is_current(epoch) {
                debug!("Discarding edit of note {} from a previous team view", note_id);
                None
            } else {
                view.store_mut()
                    .update_note_content(board_id, note_id, &note.content)
                    .then(|| view.touch())
            }
        };
        if let Some(revision) = revision {
            self.bus.view_changed(revision);
        }
        Ok(note)
    }

    /// Move a note within its board. Client-only; nothing is sent.
    pub async fn reorder_notes(&self, board_id: &str, from: usize, to: usize) -> Result<bool, SyncError> {
        let revision = {
            let mut view = self.view.write().await;
            let moved = view.store_mut().reorder_notes(board_id, from, to)?;
            moved.then(|| view.touch())
        };
        if let Some(revision) = revision {
            self.bus.view_changed(revision);
        }
        Ok(revision.is_some())
    }

    /// Move a board within the team's board list. Client-only; nothing is sent.
    pub async fn reorder_boards(&self, from: usize, to: usize) -> Result<bool, SyncError> {
        let revision = {
            let mut view = self.view.write().await;
            let moved = view.store_mut().reorder_boards(from, to)?;
            moved.then(|| view.touch())
        };
        if let Some(revision) = revision {
            self.bus.view_changed(revision);
        }
        Ok(revision.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JoinedTeam, Team};
    use crate::services::notification::{NotificationLevel, SyncEvent};
    use crate::store::{StoreError, TeamView};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    /// Request service double: records calls, optionally fails or stalls
    #[derive(Default)]
    struct ScriptedApi {
        fail: bool,
        stall: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedApi {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn stalling() -> Self {
            Self {
                stall: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn answer<T>(&self, call: String, value: T) -> Result<T, ApiError> {
            self.calls.lock().unwrap().push(call);
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail {
                return Err(ApiError::unreachable("connection refused"));
            }
            Ok(value)
        }
    }

    #[async_trait]
    impl CollabApi for ScriptedApi {
        async fn fetch_boards(&self, team_id: &str) -> Result<Vec<Board>, ApiError> {
            self.answer(format!("fetch {team_id}"), Vec::new()).await
        }

        async fn create_board(&self, team_id: &str, title: &str) -> Result<Board, ApiError> {
            self.answer(format!("create {title}"), Board::new("b-new", title, team_id))
                .await
        }

        async fn delete_board(&self, board_id: &str) -> Result<(), ApiError> {
            self.answer(format!("delete {board_id}"), ()).await
        }

        async fn add_note(&self, board_id: &str, content: &str) -> Result<Note, ApiError> {
            self.answer(format!("add {content}"), Note::new("n-new", content, board_id))
                .await
        }

        async fn delete_note(&self, _board_id: &str, note_id: &str) -> Result<(), ApiError> {
            self.answer(format!("delete-note {note_id}"), ()).await
        }

        async fn update_note(&self, board_id: &str, note_id: &str, content: &str) -> Result<Note, ApiError> {
            self.answer(format!("update {note_id}"), Note::new(note_id, content, board_id))
                .await
        }

        async fn list_teams(&self, _user_id: &str) -> Result<Vec<Team>, ApiError> {
            self.answer("teams".to_string(), Vec::new()).await
        }

        async fn create_team(&self, name: &str) -> Result<Team, ApiError> {
            self.answer("create-team".to_string(), Team::new("t-new", name, "CODE"))
                .await
        }

        async fn join_team(&self, join_code: &str) -> Result<JoinedTeam, ApiError> {
            let team = Team::new("t-join", "Joined", join_code);
            self.answer(
                "join".to_string(),
                JoinedTeam {
                    team,
                    boards: Vec::new(),
                },
            )
            .await
        }

        async fn leave_team(&self, team_id: &str) -> Result<(), ApiError> {
            self.answer(format!("leave {team_id}"), ()).await
        }
    }

    type Harness = (
        Arc<MutationPipeline<ScriptedApi>>,
        Arc<ScriptedApi>,
        SharedView,
        broadcast::Receiver<SyncEvent>,
    );

    async fn pipeline(api: ScriptedApi) -> Harness {
        let api = Arc::new(api);
        let view = TeamView::shared();
        {
            let mut view = view.write().await;
            view.activate(Team::new("t1", "One", "AAA"));
            let mut board = Board::new("b1", "Board", "t1");
            board.notes.push(Note::new("n1", "first", "b1"));
            board.notes.push(Note::new("n2", "second", "b1"));
            view.store_mut().insert_board(board);
            view.store_mut().insert_board(Board::new("b2", "Other", "t1"));
        }
        let bus = EventBus::new(32);
        let rx = bus.subscribe();
        let pipeline = Arc::new(MutationPipeline::new(
            api.clone(),
            view.clone(),
            bus,
            Duration::from_millis(50),
        ));
        (pipeline, api, view, rx)
    }

    fn notifications(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SyncEvent::Notification(n) = event {
                out.push(n);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_create_board_leaves_store_untouched() {
        let (pipeline, api, view, mut rx) = pipeline(ScriptedApi::default()).await;

        let board = pipeline.create_board("  Roadmap ").await.unwrap();

        assert_eq!(board.title, "Roadmap");
        assert_eq!(api.calls(), vec!["create Roadmap".to_string()]);
        assert!(!view.read().await.store().contains_board("b-new"));
        assert_eq!(notifications(&mut rx)[0].message, "Board created!");
        assert!(!pipeline.is_creating());
    }

    #[tokio::test]
    async fn test_create_board_rejects_blank_title() {
        let (pipeline, api, _view, _rx) = pipeline(ScriptedApi::default()).await;

        let err = pipeline.create_board("   ").await.unwrap_err();

        assert!(matches!(err, SyncError::Validation(_)));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_second_create_while_in_flight_is_rejected() {
        let (pipeline, _api, _view, _rx) = pipeline(ScriptedApi::stalling()).await;

        let first = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.create_board("One").await })
        };
        while !pipeline.is_creating() {
            tokio::task::yield_now().await;
        }

        let second = pipeline.create_board("Two").await.unwrap_err();
        assert!(matches!(second, SyncError::CreateInProgress));

        let first = first.await.unwrap().unwrap_err();
        assert!(matches!(first, SyncError::Request(ApiError::Timeout(50))));
        assert!(!pipeline.is_creating());
    }

    #[tokio::test]
    async fn test_failed_create_notifies_and_changes_nothing() {
        let (pipeline, _api, view, mut rx) = pipeline(ScriptedApi::failing()).await;
        let before = view.read().await.snapshot();

        let err = pipeline.create_board("Roadmap").await.unwrap_err();

        assert!(err.is_request_failure());
        let after = view.read().await.snapshot();
        assert_eq!(before, after);
        let notes = notifications(&mut rx);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[0].message, "Failed to create board");
    }

    #[tokio::test]
    async fn test_failed_delete_board_is_not_rolled_back() {
        let (pipeline, _api, view, mut rx) = pipeline(ScriptedApi::failing()).await;
        view.write().await.open_composer("b1");

        let err = pipeline.delete_board("b1").await.unwrap_err();

        assert!(err.is_request_failure());
        let view = view.read().await;
        assert!(!view.store().contains_board("b1"));
        assert!(view.composing().is_none());
        assert_eq!(notifications(&mut rx)[0].message, "Failed to delete board");
    }

    #[tokio::test]
    async fn test_delete_board_applies_before_request_resolves() {
        let (pipeline, _api, view, _rx) = pipeline(ScriptedApi::stalling()).await;

        let pending = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.delete_board("b1").await })
        };
        tokio::time::timeout(Duration::from_secs(1), async {
            while view.read().await.store().contains_board("b1") {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(matches!(
            pending.await.unwrap(),
            Err(SyncError::Request(ApiError::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn test_add_note_closes_composer_without_inserting() {
        let (pipeline, api, view, _rx) = pipeline(ScriptedApi::default()).await;
        view.write().await.open_composer("b2");

        let note = pipeline.add_note("b2", "hello").await.unwrap();

        assert_eq!(note.id, "n-new");
        assert_eq!(api.calls(), vec!["add hello".to_string()]);
        let view = view.read().await;
        assert!(view.composing().is_none());
        assert!(view.store().board("b2").unwrap().notes.is_empty());
    }

    #[tokio::test]
    async fn test_add_note_guards() {
        let (pipeline, api, _view, _rx) = pipeline(ScriptedApi::default()).await;

        assert!(matches!(
            pipeline.add_note("b1", " \n").await.unwrap_err(),
            SyncError::Validation(_)
        ));
        assert!(matches!(
            pipeline.add_note("ghost", "hi").await.unwrap_err(),
            SyncError::BoardNotFound { .. }
        ));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_add_note_notifies() {
        let (pipeline, _api, view, mut rx) = pipeline(ScriptedApi::failing()).await;

        pipeline.add_note("b1", "hi").await.unwrap_err();

        assert_eq!(view.read().await.store().board("b1").unwrap().notes.len(), 2);
        assert_eq!(notifications(&mut rx)[0].message, "Failed to add note");
    }

    #[tokio::test]
    async fn test_failed_delete_note_is_not_rolled_back() {
        let (pipeline, _api, view, mut rx) = pipeline(ScriptedApi::failing()).await;

        pipeline.delete_note("b1", "n1").await.unwrap_err();

        let view = view.read().await;
        let ids: Vec<_> = view
            .store()
            .board("b1")
            .unwrap()
            .notes
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ids, vec!["n2"]);
        assert_eq!(notifications(&mut rx)[0].message, "Failed to delete note");
    }

    #[tokio::test]
    async fn test_edit_note_applies_after_confirmation() {
        let (pipeline, _api, view, _rx) = pipeline(ScriptedApi::default()).await;

        pipeline.edit_note("b1", "n1", "rewritten").await.unwrap();

        let view = view.read().await;
        assert_eq!(view.store().board("b1").unwrap().note("n1").unwrap().content, "rewritten");
    }

    #[tokio::test]
    async fn test_failed_edit_leaves_content() {
        let (pipeline, _api, view, mut rx) = pipeline(ScriptedApi::failing()).await;

        pipeline.edit_note("b1", "n1", "rewritten").await.unwrap_err();

        let view = view.read().await;
        assert_eq!(view.store().board("b1").unwrap().note("n1").unwrap().content, "first");
        assert_eq!(notifications(&mut rx)[0].message, "Failed to update note");
    }

    #[tokio::test]
    async fn test_reorder_is_local_only() {
        let (pipeline, api, view, _rx) = pipeline(ScriptedApi::default()).await;

        assert!(pipeline.reorder_notes("b1", 0, 1).await.unwrap());
        assert!(pipeline.reorder_boards(1, 0).await.unwrap());
        assert!(!pipeline.reorder_boards(0, 0).await.unwrap());

        assert!(api.calls().is_empty());
        let view = view.read().await;
        let boards: Vec<_> = view.store().boards().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(boards, vec!["b2", "b1"]);
        let notes: Vec<_> = view
            .store()
            .board("b1")
            .unwrap()
            .notes
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(notes, vec!["n2", "n1"]);
    }

    #[tokio::test]
    async fn test_reorder_out_of_range() {
        let (pipeline, _api, _view, _rx) = pipeline(ScriptedApi::default()).await;

        let err = pipeline.reorder_notes("b1", 0, 5).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Store(StoreError::IndexOutOfRange { from: 0, to: 5, len: 2 })
        ));
    }

    #[tokio::test]
    async fn test_requires_active_team() {
        let (pipeline, _api, view, _rx) = pipeline(ScriptedApi::default()).await;
        view.write().await.deactivate();

        assert!(matches!(
            pipeline.create_board("Roadmap").await.unwrap_err(),
            SyncError::NoActiveTeam
        ));
        assert!(matches!(
            pipeline.delete_board("b1").await.unwrap_err(),
            SyncError::NoActiveTeam
        ));
    }
}
