//! Event Reconciler
//!
//! Merges push events from the active room into the team view. Handlers are
//! safe to run any number of times and in any relative order: inserts check
//! for the id first, deletes are plain removals, and presence is replaced
//! wholesale.
//!
//! The reconciler is the only path through which boards and notes created by
//! any client (including this one, via the echo of its own request) enter the
//! store.
//!
//! # Self-Originated Events
//!
//! When an event's actor is the session user, the change is still applied but
//! no notification is raised; the mutation pipeline already told the user.

use crate::channel::ChannelEnvelope;
use crate::events::{Actor, InboundEvent};
use crate::models::SessionUser;
use crate::services::notification::{EventBus, Notification, NotificationLevel, SyncEvent};
use crate::store::{InsertOutcome, SharedView, TeamView};
use tracing::debug;

/// What applying one event did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// The store or composer changed
    pub changed: bool,
    /// The presence count changed to this value
    pub presence: Option<u32>,
    pub notification: Option<Notification>,
}

impl Reconciliation {
    fn unchanged() -> Self {
        Self::default()
    }

    fn changed(notification: Option<Notification>) -> Self {
        Self {
            changed: true,
            presence: None,
            notification,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventReconciler {
    user: SessionUser,
    view: SharedView,
    bus: EventBus,
}

impl EventReconciler {
    pub fn new(user: SessionUser, view: SharedView, bus: EventBus) -> Self {
        Self { user, view, bus }
    }

    pub fn user(&self) -> &SessionUser {
        &self.user
    }

    fn is_self(&self, actor: Option<&Actor>) -> bool {
        actor.is_some_and(|a| a.is_user(&self.user))
    }

    fn notify_unless_self(
        &self,
        actor: Option<&Actor>,
        level: NotificationLevel,
        action: &str,
    ) -> Option<Notification> {
        if self.is_self(actor) {
            return None;
        }
        let name = actor.map(Actor::display_name).unwrap_or("Teammate");
        Some(Notification::new(level, format!("{name} {action}")))
    }

    /// Apply a validated event to the view
    pub fn apply(&self, view: &mut TeamView, event: InboundEvent) -> Reconciliation {
        let event_type = event.event_type();
        match event {
            InboundEvent::BoardCreated { board, actor } => {
                let board_id = board.id.clone();
                match view.store_mut().insert_board(board) {
                    InsertOutcome::Inserted => {
                        Reconciliation::changed(self.notify_unless_self(
                            actor.as_ref(),
                            NotificationLevel::Success,
                            "created a board",
                        ))
                    }
                    outcome => {
                        debug!("{} for board {} ignored: {:?}", event_type, board_id, outcome);
                        Reconciliation::unchanged()
                    }
                }
            }
            InboundEvent::BoardDeleted { board_id, actor } => {
                let removed = view.store_mut().remove_board(&board_id).applied();
                let composer_closed = view.forget_board(&board_id);
                if !removed && !composer_closed {
                    debug!("{} for unknown board {}", event_type, board_id);
                    return Reconciliation::unchanged();
                }
                let notification = if removed {
                    self.notify_unless_self(actor.as_ref(), NotificationLevel::Error, "deleted a board")
                } else {
                    None
                };
                Reconciliation::changed(notification)
            }
            InboundEvent::NoteAdded {
                board_id,
                note,
                actor,
            } => {
                let note_id = note.id.clone();
                match view.store_mut().insert_note(&board_id, note) {
                    InsertOutcome::Inserted => {
                        Reconciliation::changed(self.notify_unless_self(
                            actor.as_ref(),
                            NotificationLevel::Info,
                            "added a note",
                        ))
                    }
                    outcome => {
                        debug!(
                            "{} for note {} on board {} ignored: {:?}",
                            event_type, note_id, board_id, outcome
                        );
                        Reconciliation::unchanged()
                    }
                }
            }
            InboundEvent::NoteDeleted {
                board_id, note_id, ..
            } => {
                if view.store_mut().remove_note(&board_id, &note_id).applied() {
                    Reconciliation::changed(None)
                } else {
                    debug!("{} for absent note {} on board {}", event_type, note_id, board_id);
                    Reconciliation::unchanged()
                }
            }
            InboundEvent::PresenceUpdated { count } => {
                if view.presence_mut().replace(count) {
                    Reconciliation {
                        changed: false,
                        presence: Some(count),
                        notification: None,
                    }
                } else {
                    Reconciliation::unchanged()
                }
            }
        }
    }

    /// Validate a raw channel message against the active room and apply it.
    ///
    /// Messages for any other room (a previous team's events still in flight)
    /// and messages that fail to parse are dropped.
    pub fn accept(&self, view: &mut TeamView, envelope: ChannelEnvelope) -> Reconciliation {
        if view.room() != Some(&envelope.room) {
            debug!(
                "Dropping stale '{}' for room {} (active: {:?})",
                envelope.event,
                envelope.room,
                view.room().map(|r| r.as_str())
            );
            return Reconciliation::unchanged();
        }

        match InboundEvent::parse(&envelope.event, envelope.payload) {
            Ok(event) => self.apply(view, event),
            Err(e) => {
                debug!("Dropping malformed event: {}", e);
                Reconciliation::unchanged()
            }
        }
    }

    /// Apply a channel message to the shared view and publish the outcome
    pub async fn handle(&self, envelope: ChannelEnvelope) -> Reconciliation {
        let (outcome, revision) = {
            let mut view = self.view.write().await;
            let outcome = self.accept(&mut view, envelope);
            let revision = if outcome.changed {
                Some(view.touch())
            } else {
                None
            };
            (outcome, revision)
        };

        if let Some(revision) = revision {
            self.bus.view_changed(revision);
        }
        if let Some(count) = outcome.presence {
            self.bus.emit(SyncEvent::PresenceChanged { count });
        }
        if let Some(notification) = outcome.notification.clone() {
            self.bus.notify(notification);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::names;
    use crate::models::{Board, Note, RoomId, Team};
    use crate::store::TeamView;
    use serde_json::json;

    fn me() -> SessionUser {
        SessionUser::new("u1", "jane@example.com", "Jane")
    }

    fn sam() -> Actor {
        Actor::new("u2", "Sam", "sam@example.com")
    }

    fn setup() -> (EventReconciler, TeamView) {
        let mut view = TeamView::new();
        view.activate(Team::new("t1", "One", "AAA"));
        let reconciler = EventReconciler::new(me(), TeamView::shared(), EventBus::new(8));
        (reconciler, view)
    }

    fn note_added(board_id: &str, note_id: &str, content: &str) -> InboundEvent {
        InboundEvent::NoteAdded {
            board_id: board_id.to_string(),
            note: Note::new(note_id, content, board_id),
            actor: Some(sam()),
        }
    }

    fn note_deleted(board_id: &str, note_id: &str) -> InboundEvent {
        InboundEvent::NoteDeleted {
            board_id: board_id.to_string(),
            note_id: note_id.to_string(),
            actor: None,
        }
    }

    fn board_created(board_id: &str, actor: Actor) -> InboundEvent {
        InboundEvent::BoardCreated {
            board: Board::new(board_id, "Board", "t1"),
            actor: Some(actor),
        }
    }

    #[test]
    fn test_note_added_into_empty_board() {
        let (reconciler, mut view) = setup();
        view.store_mut().insert_board(Board::new("b1", "Board", "t1"));

        let outcome = reconciler.apply(&mut view, note_added("b1", "n1", "hi"));

        assert!(outcome.changed);
        let notes = &view.store().board("b1").unwrap().notes;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, "n1");
        assert_eq!(notes[0].content, "hi");
        assert_eq!(outcome.notification.unwrap().message, "Sam added a note");
    }

    #[test]
    fn test_note_added_twice_keeps_one_and_notifies_once() {
        let (reconciler, mut view) = setup();
        view.store_mut().insert_board(Board::new("b1", "Board", "t1"));

        let first = reconciler.apply(&mut view, note_added("b1", "n1", "hi"));
        let second = reconciler.apply(&mut view, note_added("b1", "n1", "hi"));

        assert!(first.notification.is_some());
        assert_eq!(second, Reconciliation::unchanged());
        assert_eq!(view.store().board("b1").unwrap().notes.len(), 1);
    }

    #[test]
    fn test_note_for_unknown_board_is_dropped() {
        let (reconciler, mut view) = setup();
        view.store_mut().insert_board(Board::new("b1", "Board", "t1"));

        let outcome = reconciler.apply(&mut view, note_added("ghost", "n1", "hi"));

        assert!(!outcome.changed);
        assert!(outcome.notification.is_none());
        assert!(view
            .store()
            .boards()
            .iter()
            .all(|b| !b.contains_note("n1")));
    }

    #[test]
    fn test_note_deleted_before_added_leaves_no_note() {
        let (reconciler, mut view) = setup();
        view.store_mut().insert_board(Board::new("b1", "Board", "t1"));

        reconciler.apply(&mut view, note_deleted("b1", "n1"));
        let late = reconciler.apply(&mut view, note_added("b1", "n1", "hi"));

        assert!(!late.changed);
        assert!(view.store().board("b1").unwrap().notes.is_empty());
    }

    #[test]
    fn test_note_deleted_after_added_removes_it() {
        let (reconciler, mut view) = setup();
        view.store_mut().insert_board(Board::new("b1", "Board", "t1"));

        reconciler.apply(&mut view, note_added("b1", "n1", "hi"));
        let outcome = reconciler.apply(&mut view, note_deleted("b1", "n1"));
        let again = reconciler.apply(&mut view, note_deleted("b1", "n1"));

        assert!(outcome.changed);
        assert!(!again.changed);
        assert!(view.store().board("b1").unwrap().notes.is_empty());
    }

    #[test]
    fn test_own_board_created_applies_silently() {
        let (reconciler, mut view) = setup();
        let own = Actor {
            id: Some("u1".to_string()),
            ..Default::default()
        };

        let first = reconciler.apply(&mut view, board_created("b1", own.clone()));
        let echo = reconciler.apply(&mut view, board_created("b1", own));

        assert!(first.changed);
        assert!(first.notification.is_none());
        assert!(!echo.changed);
        assert_eq!(view.store().len(), 1);
    }

    #[test]
    fn test_peer_board_created_notifies() {
        let (reconciler, mut view) = setup();
        let outcome = reconciler.apply(&mut view, board_created("b1", sam()));

        let notification = outcome.notification.unwrap();
        assert_eq!(notification.level, NotificationLevel::Success);
        assert_eq!(notification.message, "Sam created a board");
    }

    #[test]
    fn test_board_deleted_closes_composer() {
        let (reconciler, mut view) = setup();
        view.store_mut().insert_board(Board::new("b1", "Board", "t1"));
        view.open_composer("b1");

        let outcome = reconciler.apply(
            &mut view,
            InboundEvent::BoardDeleted {
                board_id: "b1".to_string(),
                actor: Some(sam()),
            },
        );

        assert!(outcome.changed);
        assert!(view.composing().is_none());
        assert!(view.store().is_empty());
        assert_eq!(outcome.notification.unwrap().message, "Sam deleted a board");
    }

    #[test]
    fn test_own_board_deleted_is_silent() {
        let (reconciler, mut view) = setup();
        view.store_mut().insert_board(Board::new("b1", "Board", "t1"));
        let own = Actor {
            email: Some("jane@example.com".to_string()),
            ..Default::default()
        };

        let outcome = reconciler.apply(
            &mut view,
            InboundEvent::BoardDeleted {
                board_id: "b1".to_string(),
                actor: Some(own),
            },
        );
        assert!(outcome.changed);
        assert!(outcome.notification.is_none());
    }

    #[test]
    fn test_delete_and_create_commute() {
        let orders: [[usize; 2]; 2] = [[0, 1], [1, 0]];
        for order in orders {
            let (reconciler, mut view) = setup();
            view.store_mut().insert_board(Board::new("b1", "Board", "t1"));

            let events = [
                InboundEvent::BoardDeleted {
                    board_id: "b1".to_string(),
                    actor: None,
                },
                board_created("b2", sam()),
            ];
            for index in order {
                reconciler.apply(&mut view, events[index].clone());
            }

            let ids: Vec<_> = view.store().boards().iter().map(|b| b.id.as_str()).collect();
            assert_eq!(ids, vec!["b2"]);
        }
    }

    #[test]
    fn test_presence_replaced_wholesale() {
        let (reconciler, mut view) = setup();
        let outcome = reconciler.apply(&mut view, InboundEvent::PresenceUpdated { count: 4 });
        assert_eq!(outcome.presence, Some(4));
        assert_eq!(view.presence().count(), 4);

        let same = reconciler.apply(&mut view, InboundEvent::PresenceUpdated { count: 4 });
        assert_eq!(same.presence, None);
    }

    #[test]
    fn test_accept_drops_other_rooms_and_malformed() {
        let (reconciler, mut view) = setup();
        view.store_mut().insert_board(Board::new("b1", "Board", "t1"));

        let stale = ChannelEnvelope::new(
            RoomId::for_team("t0"),
            names::NOTE_ADDED,
            json!({"boardId": "b1", "note": {"_id": "n1", "content": "old"}}),
        );
        let malformed = ChannelEnvelope::new(RoomId::for_team("t1"), names::NOTE_ADDED, json!({"note": 1}));

        assert!(!reconciler.accept(&mut view, stale).changed);
        assert!(!reconciler.accept(&mut view, malformed).changed);
        assert!(view.store().board("b1").unwrap().notes.is_empty());

        let live = ChannelEnvelope::new(
            RoomId::for_team("t1"),
            names::NOTE_ADDED,
            json!({"boardId": "b1", "note": {"_id": "n1", "content": "new"}}),
        );
        assert!(reconciler.accept(&mut view, live).changed);
    }

    #[tokio::test]
    async fn test_handle_publishes_view_change_and_notification() {
        let view = TeamView::shared();
        view.write().await.activate(Team::new("t1", "One", "AAA"));
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let reconciler = EventReconciler::new(me(), view.clone(), bus);

        let outcome = reconciler
            .handle(ChannelEnvelope::new(
                RoomId::for_team("t1"),
                names::BOARD_CREATED,
                json!({"_id": "b1", "title": "Ideas", "createdBy": {"_id": "u2", "name": "Sam"}}),
            ))
            .await;

        assert!(outcome.changed);
        assert!(matches!(rx.recv().await.unwrap(), SyncEvent::ViewChanged { .. }));
        assert!(matches!(rx.recv().await.unwrap(), SyncEvent::Notification(_)));
        assert!(view.read().await.store().contains_board("b1"));
    }
}
