//! Push-Event Channel
//!
//! The channel is one long-lived, process-wide connection. It is injected into
//! the sync client rather than owned by it, and exposes a single operation:
//! send the join-room signal and hand back a [`RoomSubscription`] that only
//! yields that room's messages.
//!
//! Switching teams means joining the new room and dropping the old
//! subscription; no leave signal is sent for the previous room.

mod error;

pub use error::ChannelError;

use crate::models::{RoomId, SessionUser, Team};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// A raw message as delivered by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEnvelope {
    pub room: RoomId,
    pub event: String,
    pub payload: Value,
}

impl ChannelEnvelope {
    pub fn new(room: RoomId, event: impl Into<String>, payload: Value) -> Self {
        Self {
            room,
            event: event.into(),
            payload,
        }
    }
}

/// Member details sent along with the join-room signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

/// The `joinTeam` signal: `{"teamId": "team:<id>", "user": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub team_id: RoomId,
    pub user: JoinRoomUser,
}

impl JoinRoom {
    pub fn new(team: &Team, user: &SessionUser) -> Self {
        Self {
            team_id: team.room(),
            user: JoinRoomUser {
                id: user.user_id.clone(),
                name: user.display_name.clone(),
                email: user.email.clone(),
            },
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.team_id
    }
}

/// Room-scoped publish/subscribe connection
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Emit the join-room signal and subscribe to the room's filtered stream
    async fn join_room(&self, join: JoinRoom) -> Result<RoomSubscription, ChannelError>;
}

/// Stream of one room's messages. Dropping it unsubscribes.
pub struct RoomSubscription {
    room: RoomId,
    stream: BroadcastStream<ChannelEnvelope>,
}

impl std::fmt::Debug for RoomSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSubscription")
            .field("room", &self.room)
            .finish_non_exhaustive()
    }
}

impl RoomSubscription {
    pub fn new(room: RoomId, receiver: broadcast::Receiver<ChannelEnvelope>) -> Self {
        Self {
            room,
            stream: BroadcastStream::new(receiver),
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Next message for this room, or `None` once the connection is closed.
    ///
    /// Messages addressed to other rooms are skipped. A lagging receiver logs
    /// and carries on; there is no backlog replay.
    pub async fn next_envelope(&mut self) -> Option<ChannelEnvelope> {
        loop {
            match self.stream.next().await {
                Some(Ok(envelope)) if envelope.room == self.room => return Some(envelope),
                Some(Ok(envelope)) => {
                    debug!(
                        "Skipping '{}' for room {} on subscription to {}",
                        envelope.event, envelope.room, self.room
                    );
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(
                        "Subscription to {} lagged, {} event(s) skipped",
                        self.room, skipped
                    );
                }
                None => return None,
            }
        }
    }
}
