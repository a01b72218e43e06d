//! Inbound Push Events
//!
//! The push channel delivers events as a name plus a JSON payload. This module
//! is the boundary where those raw messages become a typed [`InboundEvent`]:
//! every variant's required fields are validated here, and anything that does
//! not parse is rejected so the reconciler never looks at optional fields ad hoc.
//!
//! # Event Names
//!
//! | Name | Variant |
//! |---|---|
//! | `board-created` | [`InboundEvent::BoardCreated`] |
//! | `board-deleted` | [`InboundEvent::BoardDeleted`] |
//! | `note-added` | [`InboundEvent::NoteAdded`] |
//! | `note-deleted` | [`InboundEvent::NoteDeleted`] |
//! | `team-users-count` (alias `presence-updated`) | [`InboundEvent::PresenceUpdated`] |
//!
//! # Payload Shapes
//!
//! The server has sent `board-created` both as a bare board carrying a
//! `createdBy` field and wrapped as `{board, actor}`; `board-deleted` has
//! carried the id as `boardId`, `_id` or a bare string. All of these parse to
//! the same variant.

use crate::models::{Board, Note, SessionUser, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod names {
    pub const BOARD_CREATED: &str = "board-created";
    pub const BOARD_DELETED: &str = "board-deleted";
    pub const NOTE_ADDED: &str = "note-added";
    pub const NOTE_DELETED: &str = "note-deleted";
    pub const TEAM_USERS_COUNT: &str = "team-users-count";
    pub const PRESENCE_UPDATED: &str = "presence-updated";
    pub const JOIN_TEAM: &str = "joinTeam";
}

/// Errors raised while turning a raw channel message into an [`InboundEvent`]
#[derive(Error, Debug)]
pub enum EventParseError {
    #[error("Unknown event: {name}")]
    UnknownEvent { name: String },

    #[error("Malformed '{event}' payload: {message}")]
    InvalidPayload { event: String, message: String },

    #[error("Invalid '{event}' payload: {source}")]
    Validation {
        event: String,
        #[source]
        source: ValidationError,
    },
}

impl EventParseError {
    pub fn unknown_event(name: impl Into<String>) -> Self {
        Self::UnknownEvent { name: name.into() }
    }

    pub fn invalid_payload(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event: event.into(),
            message: message.into(),
        }
    }

    pub fn validation(event: impl Into<String>, source: ValidationError) -> Self {
        Self::Validation {
            event: event.into(),
            source,
        }
    }
}

/// The member who caused an event, as reported by the server.
///
/// Servers send either a user object or just the user's id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ActorRepr")]
pub struct Actor {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActorRepr {
    Id(String),
    User {
        #[serde(default, rename = "_id", alias = "id")]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        email: Option<String>,
    },
}

impl From<ActorRepr> for Actor {
    fn from(repr: ActorRepr) -> Self {
        match repr {
            ActorRepr::Id(id) => Actor {
                id: Some(id),
                ..Default::default()
            },
            ActorRepr::User { id, name, email } => Actor { id, name, email },
        }
    }
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            email: Some(email.into()),
        }
    }

    /// True if the actor is the session user, matched by id or by email
    pub fn is_user(&self, user: &SessionUser) -> bool {
        let same_id = self.id.as_deref().is_some_and(|id| id == user.user_id);
        let same_email = self
            .email
            .as_deref()
            .is_some_and(|email| !email.is_empty() && email.eq_ignore_ascii_case(&user.email));
        same_id || same_email
    }

    /// Name to show in notifications
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Teammate")
    }
}

/// A validated push event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    BoardCreated {
        board: Board,
        actor: Option<Actor>,
    },
    BoardDeleted {
        board_id: String,
        actor: Option<Actor>,
    },
    NoteAdded {
        board_id: String,
        note: Note,
        actor: Option<Actor>,
    },
    NoteDeleted {
        board_id: String,
        note_id: String,
        actor: Option<Actor>,
    },
    PresenceUpdated {
        count: u32,
    },
}

impl InboundEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            InboundEvent::BoardCreated { .. } => names::BOARD_CREATED,
            InboundEvent::BoardDeleted { .. } => names::BOARD_DELETED,
            InboundEvent::NoteAdded { .. } => names::NOTE_ADDED,
            InboundEvent::NoteDeleted { .. } => names::NOTE_DELETED,
            InboundEvent::PresenceUpdated { .. } => names::TEAM_USERS_COUNT,
        }
    }

    /// Parse and validate a raw channel message
    pub fn parse(name: &str, payload: Value) -> Result<Self, EventParseError> {
        match name {
            names::BOARD_CREATED => {
                let (board, actor) = match decode::<BoardCreatedPayload>(name, payload)? {
                    BoardCreatedPayload::Wrapped { board, actor } => (board, actor),
                    BoardCreatedPayload::Flat { board, actor } => (board, actor),
                };
                board
                    .validate()
                    .map_err(|e| EventParseError::validation(name, e))?;
                Ok(InboundEvent::BoardCreated { board, actor })
            }
            names::BOARD_DELETED => {
                let (board_id, actor) = match decode::<BoardDeletedPayload>(name, payload)? {
                    BoardDeletedPayload::Id(board_id) => (board_id, None),
                    BoardDeletedPayload::Object { board_id, actor } => (board_id, actor),
                };
                require_id(name, "boardId", &board_id)?;
                Ok(InboundEvent::BoardDeleted { board_id, actor })
            }
            names::NOTE_ADDED => {
                let payload = decode::<NoteAddedPayload>(name, payload)?;
                require_id(name, "boardId", &payload.board_id)?;

                let NoteWire { mut note, author } = payload.note;
                note.validate()
                    .map_err(|e| EventParseError::validation(name, e))?;
                if note.author_id.is_none() {
                    note.author_id = author.as_ref().and_then(|a| a.id.clone());
                }
                note.board_id = payload.board_id.clone();

                Ok(InboundEvent::NoteAdded {
                    board_id: payload.board_id,
                    note,
                    actor: payload.actor.or(author),
                })
            }
            names::NOTE_DELETED => {
                let payload = decode::<NoteDeletedPayload>(name, payload)?;
                require_id(name, "boardId", &payload.board_id)?;
                require_id(name, "noteId", &payload.note_id)?;
                Ok(InboundEvent::NoteDeleted {
                    board_id: payload.board_id,
                    note_id: payload.note_id,
                    actor: payload.actor,
                })
            }
            names::TEAM_USERS_COUNT | names::PRESENCE_UPDATED => {
                let count = match decode::<PresencePayload>(name, payload)? {
                    PresencePayload::Count(n) => n,
                    PresencePayload::Members(members) => members.len() as u64,
                    PresencePayload::Object { count } => count,
                };
                Ok(InboundEvent::PresenceUpdated {
                    count: u32::try_from(count).unwrap_or(u32::MAX),
                })
            }
            other => Err(EventParseError::unknown_event(other)),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, payload: Value) -> Result<T, EventParseError> {
    serde_json::from_value(payload).map_err(|e| EventParseError::invalid_payload(event, e.to_string()))
}

fn require_id(event: &str, field: &str, value: &str) -> Result<(), EventParseError> {
    if value.trim().is_empty() {
        return Err(EventParseError::validation(
            event,
            ValidationError::missing_field(field),
        ));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoardCreatedPayload {
    Wrapped {
        board: Board,
        #[serde(default, alias = "createdBy", alias = "user")]
        actor: Option<Actor>,
    },
    Flat {
        #[serde(flatten)]
        board: Board,
        #[serde(default, rename = "createdBy", alias = "actor")]
        actor: Option<Actor>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoardDeletedPayload {
    Id(String),
    Object {
        #[serde(rename = "boardId", alias = "_id", alias = "id")]
        board_id: String,
        #[serde(default, alias = "deletedBy")]
        actor: Option<Actor>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteAddedPayload {
    board_id: String,
    note: NoteWire,
    #[serde(default, alias = "addedBy")]
    actor: Option<Actor>,
}

/// Note as the server sends it: the note plus its author object
#[derive(Deserialize)]
struct NoteWire {
    #[serde(flatten)]
    note: Note,
    #[serde(default, rename = "user", alias = "author")]
    author: Option<Actor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteDeletedPayload {
    board_id: String,
    #[serde(alias = "_id")]
    note_id: String,
    #[serde(default, alias = "deletedBy")]
    actor: Option<Actor>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PresencePayload {
    Count(u64),
    Members(Vec<Value>),
    Object { count: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> SessionUser {
        SessionUser::new("u1", "jane@example.com", "Jane")
    }

    #[test]
    fn test_board_created_flat_shape() {
        let event = InboundEvent::parse(
            names::BOARD_CREATED,
            json!({
                "_id": "b1",
                "title": "Q1 Marketing",
                "teamId": "t1",
                "notes": [],
                "createdBy": {"_id": "u2", "name": "Sam"}
            }),
        )
        .unwrap();

        match event {
            InboundEvent::BoardCreated { board, actor } => {
                assert_eq!(board.id, "b1");
                assert_eq!(board.title, "Q1 Marketing");
                assert_eq!(actor.unwrap().display_name(), "Sam");
            }
            other => panic!("Expected BoardCreated, got {:?}", other),
        }
    }

    #[test]
    fn test_board_created_wrapped_shape() {
        let event = InboundEvent::parse(
            names::BOARD_CREATED,
            json!({
                "board": {"_id": "b1", "title": "Roadmap"},
                "actor": "u1"
            }),
        )
        .unwrap();

        match event {
            InboundEvent::BoardCreated { board, actor } => {
                assert_eq!(board.id, "b1");
                assert!(actor.unwrap().is_user(&user()));
            }
            other => panic!("Expected BoardCreated, got {:?}", other),
        }
    }

    #[test]
    fn test_board_created_without_id_is_rejected() {
        let err = InboundEvent::parse(names::BOARD_CREATED, json!({"title": "No id"})).unwrap_err();
        assert!(matches!(err, EventParseError::InvalidPayload { .. }));

        let err = InboundEvent::parse(names::BOARD_CREATED, json!({"_id": "", "title": "Blank"}))
            .unwrap_err();
        assert!(matches!(err, EventParseError::Validation { .. }));
    }

    #[test]
    fn test_board_deleted_shapes() {
        let shapes = [
            json!({"boardId": "b1", "deletedBy": {"name": "Sam", "email": "sam@example.com"}}),
            json!({"_id": "b1"}),
            json!("b1"),
        ];
        for payload in shapes {
            match InboundEvent::parse(names::BOARD_DELETED, payload).unwrap() {
                InboundEvent::BoardDeleted { board_id, .. } => assert_eq!(board_id, "b1"),
                other => panic!("Expected BoardDeleted, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_note_added_takes_author_from_user_object() {
        let event = InboundEvent::parse(
            names::NOTE_ADDED,
            json!({
                "boardId": "b1",
                "note": {
                    "_id": "n1",
                    "content": "hi",
                    "user": {"_id": "u2", "name": "Sam", "email": "sam@example.com"}
                }
            }),
        )
        .unwrap();

        match event {
            InboundEvent::NoteAdded { board_id, note, actor } => {
                assert_eq!(board_id, "b1");
                assert_eq!(note.id, "n1");
                assert_eq!(note.board_id, "b1");
                assert_eq!(note.author_id.as_deref(), Some("u2"));
                assert_eq!(actor.unwrap().email.as_deref(), Some("sam@example.com"));
            }
            other => panic!("Expected NoteAdded, got {:?}", other),
        }
    }

    #[test]
    fn test_note_added_missing_board_is_rejected() {
        let err = InboundEvent::parse(names::NOTE_ADDED, json!({"note": {"_id": "n1"}})).unwrap_err();
        assert!(matches!(err, EventParseError::InvalidPayload { .. }));
    }

    #[test]
    fn test_note_deleted() {
        let event =
            InboundEvent::parse(names::NOTE_DELETED, json!({"boardId": "b1", "noteId": "n1"})).unwrap();
        assert_eq!(
            event,
            InboundEvent::NoteDeleted {
                board_id: "b1".to_string(),
                note_id: "n1".to_string(),
                actor: None,
            }
        );
    }

    #[test]
    fn test_presence_count_and_collection_normalize() {
        let raw = InboundEvent::parse(names::TEAM_USERS_COUNT, json!(3)).unwrap();
        let list = InboundEvent::parse(names::TEAM_USERS_COUNT, json!([{"id": 1}, {"id": 2}])).unwrap();
        let object = InboundEvent::parse(names::PRESENCE_UPDATED, json!({"count": 5})).unwrap();

        assert_eq!(raw, InboundEvent::PresenceUpdated { count: 3 });
        assert_eq!(list, InboundEvent::PresenceUpdated { count: 2 });
        assert_eq!(object, InboundEvent::PresenceUpdated { count: 5 });
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let err = InboundEvent::parse("board-renamed", json!({})).unwrap_err();
        assert!(matches!(err, EventParseError::UnknownEvent { .. }));
    }

    #[test]
    fn test_actor_matches_by_id_or_email() {
        let by_id = Actor {
            id: Some("u1".to_string()),
            ..Default::default()
        };
        let by_email = Actor {
            email: Some("JANE@example.com".to_string()),
            ..Default::default()
        };
        let stranger = Actor::new("u9", "Sam", "sam@example.com");

        assert!(by_id.is_user(&user()));
        assert!(by_email.is_user(&user()));
        assert!(!stranger.is_user(&user()));
        assert!(!Actor::default().is_user(&user()));
        assert_eq!(Actor::default().display_name(), "Teammate");
    }
}
