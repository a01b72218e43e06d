//! Client Session
//!
//! The session is created once the external session provider has authenticated
//! the user, and cleared on sign-out. It carries the identity used to recognise
//! self-originated events and the team whose room the channel is subscribed to.

use crate::models::Team;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity supplied by the session provider. Read-only for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
}

impl SessionUser {
    /// Build a session user; a blank display name is derived from the email.
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let email = email.into();
        let display_name = display_name.into();
        let display_name = if display_name.trim().is_empty() {
            display_name_from_email(&email)
        } else {
            display_name
        };
        Self {
            user_id: user_id.into(),
            email,
            display_name,
        }
    }
}

/// Derive a readable name from the email local part.
///
/// `jane.doe@example.com` becomes `Jane Doe`; an empty email yields `User`.
pub fn display_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let words: Vec<String> = local
        .split(|c: char| c == '.' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        "User".to_string()
    } else {
        words.join(" ")
    }
}

/// Process-wide session state for one running client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    pub user: SessionUser,

    /// Team whose room the channel is currently subscribed to
    pub active_team: Option<Team>,

    /// Stable identity of this client's channel connection
    pub channel_identity: String,
}

impl ClientSession {
    pub fn new(user: SessionUser) -> Self {
        Self {
            user,
            active_team: None,
            channel_identity: Uuid::new_v4().to_string(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user.user_id
    }

    pub fn active_team_id(&self) -> Option<&str> {
        self.active_team.as_ref().map(|t| t.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_from_email() {
        assert_eq!(display_name_from_email("jane.doe@example.com"), "Jane Doe");
        assert_eq!(display_name_from_email("max_power@x.io"), "Max Power");
        assert_eq!(display_name_from_email("solo@x.io"), "Solo");
        assert_eq!(display_name_from_email(""), "User");
    }

    #[test]
    fn test_session_user_keeps_explicit_name() {
        let user = SessionUser::new("u1", "jane.doe@example.com", "JD");
        assert_eq!(user.display_name, "JD");

        let derived = SessionUser::new("u1", "jane.doe@example.com", "  ");
        assert_eq!(derived.display_name, "Jane Doe");
    }

    #[test]
    fn test_new_session_has_unique_channel_identity() {
        let user = SessionUser::new("u1", "a@b.c", "A");
        let a = ClientSession::new(user.clone());
        let b = ClientSession::new(user);
        assert_ne!(a.channel_identity, b.channel_identity);
        assert!(a.active_team_id().is_none());
    }
}
