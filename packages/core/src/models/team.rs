//! Team Data Structures
//!
//! A team is the collaboration scope: its boards live in one broadcast room,
//! and exactly one team is active per client session.

use serde::{Deserialize, Serialize};

/// Prefix the server uses for team-scoped broadcast rooms
const ROOM_PREFIX: &str = "team:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,

    pub name: String,

    /// Invite code other members use to join
    #[serde(default)]
    pub join_code: String,
}

impl Team {
    pub fn new(id: impl Into<String>, name: impl Into<String>, join_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            join_code: join_code.into(),
        }
    }

    pub fn room(&self) -> RoomId {
        RoomId::for_team(&self.id)
    }
}

/// Name of a server-defined broadcast scope (`team:<id>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn for_team(team_id: &str) -> Self {
        Self(format!("{ROOM_PREFIX}{team_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Team id this room is scoped to, if the name follows the team convention
    pub fn team_id(&self) -> Option<&str> {
        self.0.strip_prefix(ROOM_PREFIX)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response of a successful join-by-code: the team plus its current boards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedTeam {
    pub team: Team,

    #[serde(default)]
    pub boards: Vec<crate::models::Board>,
}
