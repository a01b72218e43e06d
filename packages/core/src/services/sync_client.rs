//! Sync Client
//!
//! The facade a front end talks to. One `SyncClient` represents one signed-in
//! client process: it owns the session, the active team's view, the room
//! listener and the mutation pipeline, and it exposes:
//!
//! - a read-only [`ViewSnapshot`] plus the presence count
//! - one operation per user intent (boards, notes, reordering, composer)
//! - team workspace operations (list, create, join, leave, switch)
//! - a [`SyncEvent`] stream carrying notifications and change signals
//!
//! # Team Activation
//!
//! Activating a team clears the view, joins the team's room, and then fetches
//! the team's boards. The room is joined first so that nothing created while
//! the fetch is in flight is missed; the fetched list is merged by id with
//! whatever the reconciler inserted meanwhile. If another activation starts
//! before the fetch completes, its result is discarded.
//!
//! Resetting the view and replacing the room listener happen under one
//! activation lock, so overlapping switches always leave the listener on the
//! room of the team the view ends up showing.

use crate::api::{ApiError, CollabApi};
use crate::channel::{ChannelEnvelope, JoinRoom, PushChannel};
use crate::config::SyncConfig;
use crate::models::{Board, ClientSession, Note, RoomId, SessionUser, Team, ValidationError};
use crate::services::error::SyncError;
use crate::services::mutation_pipeline::{with_timeout, MutationPipeline};
use crate::services::notification::{EventBus, Notification, SyncEvent};
use crate::services::reconciler::{EventReconciler, Reconciliation};
use crate::services::room::RoomMembership;
use crate::store::{SharedView, TeamView, ViewSnapshot};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

pub struct SyncClient<A: CollabApi, C: PushChannel> {
    config: SyncConfig,
    api: Arc<A>,
    room: Arc<RoomMembership<C>>,
    activation: Arc<Mutex<()>>,
    view: SharedView,
    session: Arc<RwLock<Option<ClientSession>>>,
    bus: EventBus,
    pipeline: Arc<MutationPipeline<A>>,
}

impl<A: CollabApi, C: PushChannel> Clone for SyncClient<A, C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            api: self.api.clone(),
            room: self.room.clone(),
            activation: self.activation.clone(),
            view: self.view.clone(),
            session: self.session.clone(),
            bus: self.bus.clone(),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<A: CollabApi, C: PushChannel> SyncClient<A, C> {
    pub fn new(config: SyncConfig, api: Arc<A>, channel: Arc<C>) -> Self {
        let view = TeamView::shared();
        let bus = EventBus::new(config.notification_buffer);
        let pipeline = Arc::new(MutationPipeline::new(
            api.clone(),
            view.clone(),
            bus.clone(),
            config.request_timeout(),
        ));

        Self {
            config,
            api,
            room: Arc::new(RoomMembership::new(channel)),
            activation: Arc::new(Mutex::new(())),
            view,
            session: Arc::new(RwLock::new(None)),
            bus,
            pipeline,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Subscribe to notifications and change signals
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.bus.subscribe()
    }

    // ---- Session ----

    /// Start a session for an authenticated user. Any previous session is
    /// torn down first.
    pub async fn sign_in(&self, user: SessionUser) -> ClientSession {
        self.teardown().await;
        let session = ClientSession::new(user);
        info!(
            "👤 Signed in as {} ({})",
            session.user.display_name, session.channel_identity
        );
        *self.session.write().await = Some(session.clone());
        session
    }

    pub async fn session(&self) -> Option<ClientSession> {
        self.session.read().await.clone()
    }

    /// End the session: stop listening and clear the view
    pub async fn sign_out(&self) {
        self.teardown().await;
        if self.session.write().await.take().is_some() {
            info!("👋 Signed out");
        }
    }

    async fn teardown(&self) {
        let _activation = self.activation.lock().await;
        self.room.leave().await;
        let revision = {
            let mut view = self.view.write().await;
            if view.team().is_none() {
                return;
            }
            view.deactivate();
            view.revision()
        };
        self.bus.view_changed(revision);
    }

    async fn current_user(&self) -> Result<SessionUser, SyncError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.user.clone())
            .ok_or(SyncError::NotSignedIn)
    }

    fn reconciler(&self, user: SessionUser) -> EventReconciler {
        EventReconciler::new(user, self.view.clone(), self.bus.clone())
    }

    // ---- Team lifecycle ----

    pub async fn active_team(&self) -> Option<Team> {
        self.view.read().await.team().cloned()
    }

    /// Make `team` the active team: clear the view, join its room and load
    /// its boards.
    pub async fn activate_team(&self, team: Team) -> Result<(), SyncError> {
        self.activate(team, None).await
    }

    async fn activate(&self, team: Team, seed: Option<Vec<Board>>) -> Result<(), SyncError> {
        let user = self.current_user().await?;

        let epoch = {
            let _activation = self.activation.lock().await;
            let (epoch, revision) = {
                let mut view = self.view.write().await;
                let epoch = view.activate(team.clone());
                (epoch, view.revision())
            };
            self.bus.view_changed(revision);

            if let Some(session) = self.session.write().await.as_mut() {
                session.active_team = Some(team.clone());
            }

            let join = JoinRoom::new(&team, &user);
            if let Err(e) = self
                .room
                .switch(join, self.reconciler(user), self.bus.clone())
                .await
            {
                warn!("Could not join room {}: {}", team.room(), e);
                self.bus
                    .notify(Notification::error("Live updates unavailable for this team"));
            }
            epoch
        };

        let boards = match seed {
            Some(boards) => boards,
            None => {
                match with_timeout(self.config.request_timeout(), self.api.fetch_boards(&team.id)).await {
                    Ok(boards) => boards,
                    Err(e) => {
                        warn!("Failed to load boards for team {}: {}", team.id, e);
                        self.bus.notify(Notification::error("Failed to load boards"));
                        return Err(e.into());
                    }
                }
            }
        };

        let revision = {
            let mut view = self.view.write().await;
            if !view.is_current(epoch) {
                debug!("Discarding boards for team {} fetched under a previous view", team.id);
                return Ok(());
            }
            view.store_mut().merge_snapshot(boards);
            view.touch()
        };
        self.bus.view_changed(revision);

        info!("🗂️ Activated team {} ({})", team.name, team.id);
        Ok(())
    }

    /// Activate another team and tell the user about it
    pub async fn switch_team(&self, team: Team) -> Result<(), SyncError> {
        let name = team.name.clone();
        self.activate_team(team).await?;
        self.bus
            .notify(Notification::info(format!("Switched to workspace: {name}")));
        Ok(())
    }

    pub async fn list_teams(&self) -> Result<Vec<Team>, SyncError> {
        let user = self.current_user().await?;
        with_timeout(self.config.request_timeout(), self.api.list_teams(&user.user_id))
            .await
            .map_err(|e| self.request_failed("Failed to load teams", e))
    }

    /// Create a team and make it active
    pub async fn create_team(&self, name: &str) -> Result<Team, SyncError> {
        if name.trim().is_empty() {
            return Err(ValidationError::blank_field("name").into());
        }
        self.current_user().await?;

        let team = with_timeout(self.config.request_timeout(), self.api.create_team(name.trim()))
            .await
            .map_err(|e| self.request_failed("Failed to create team", e))?;

        self.bus
            .notify(Notification::success(format!("Team \"{}\" created!", team.name)));
        self.activate_team(team.clone()).await?;
        Ok(team)
    }

    /// Join a team by its join code and make it active.
    ///
    /// The boards returned with the join seed the view; no separate fetch is
    /// issued.
    pub async fn join_team(&self, join_code: &str) -> Result<Team, SyncError> {
        if join_code.trim().is_empty() {
            return Err(ValidationError::blank_field("joinCode").into());
        }
        self.current_user().await?;

        let joined = match with_timeout(
            self.config.request_timeout(),
            self.api.join_team(join_code.trim()),
        )
        .await
        {
            Ok(joined) => joined,
            Err(e) => {
                let message = e.server_message().unwrap_or("Invalid Join Code").to_string();
                return Err(self.request_failed(&message, e));
            }
        };

        let team = joined.team;
        self.activate(team.clone(), Some(joined.boards)).await?;
        self.bus
            .notify(Notification::success(format!("Joined {}", team.name)));
        Ok(team)
    }

    /// Leave a team. If it is the active team, the view is cleared and the
    /// room listener stops.
    pub async fn leave_team(&self, team_id: &str) -> Result<(), SyncError> {
        self.current_user().await?;

        with_timeout(self.config.request_timeout(), self.api.leave_team(team_id))
            .await
            .map_err(|e| self.request_failed("Failed to remove team", e))?;

        let was_active = self.view.read().await.team().is_some_and(|t| t.id == team_id);
        if was_active {
            self.teardown().await;
            if let Some(session) = self.session.write().await.as_mut() {
                session.active_team = None;
            }
        }
        self.bus.notify(Notification::success("Team removed"));
        Ok(())
    }

    fn request_failed(&self, message: &str, error: ApiError) -> SyncError {
        warn!("{}: {}", message, error);
        self.bus.notify(Notification::error(message));
        SyncError::Request(error)
    }

    // ---- Rendering ----

    pub async fn snapshot(&self) -> ViewSnapshot {
        self.view.read().await.snapshot()
    }

    pub async fn online_count(&self) -> u32 {
        self.view.read().await.presence().count()
    }

    /// Room the listener is currently subscribed to
    pub async fn live_room(&self) -> Option<RoomId> {
        self.room.current_room().await
    }

    pub async fn open_composer(&self, board_id: &str) -> bool {
        let revision = {
            let mut view = self.view.write().await;
            view.open_composer(board_id).then(|| view.touch())
        };
        if let Some(revision) = revision {
            self.bus.view_changed(revision);
        }
        revision.is_some()
    }

    pub async fn close_composer(&self) -> bool {
        let revision = {
            let mut view = self.view.write().await;
            view.close_composer().then(|| view.touch())
        };
        if let Some(revision) = revision {
            self.bus.view_changed(revision);
        }
        revision.is_some()
    }

    // ---- Intents ----

    pub async fn create_board(&self, title: &str) -> Result<Board, SyncError> {
        self.pipeline.create_board(title).await
    }

    pub async fn delete_board(&self, board_id: &str) -> Result<(), SyncError> {
        self.pipeline.delete_board(board_id).await
    }

    pub async fn add_note(&self, board_id: &str, content: &str) -> Result<Note, SyncError> {
        self.pipeline.add_note(board_id, content).await
    }

    pub async fn delete_note(&self, board_id: &str, note_id: &str) -> Result<(), SyncError> {
        self.pipeline.delete_note(board_id, note_id).await
    }

    pub async fn edit_note(&self, board_id: &str, note_id: &str, content: &str) -> Result<Note, SyncError> {
        self.pipeline.edit_note(board_id, note_id, content).await
    }

    pub async fn reorder_notes(&self, board_id: &str, from: usize, to: usize) -> Result<bool, SyncError> {
        self.pipeline.reorder_notes(board_id, from, to).await
    }

    pub async fn reorder_boards(&self, from: usize, to: usize) -> Result<bool, SyncError> {
        self.pipeline.reorder_boards(from, to).await
    }

    /// Feed one channel message through the reconciler directly, bypassing
    /// the room listener
    pub async fn handle_envelope(&self, envelope: ChannelEnvelope) -> Result<Reconciliation, SyncError> {
        let user = self.current_user().await?;
        Ok(self.reconciler(user).handle(envelope).await)
    }
}
