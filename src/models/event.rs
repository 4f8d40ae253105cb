//! Room update payloads pushed to connected clients.

use serde::{Deserialize, Serialize};

/// What kind of message a room update carries.
///
/// Presence transitions (`Join`, `Disconnect`, `Timeout`) and profile
/// changes (`UserInfo`, `UserGroup`, `UserAction`) alter the room's
/// userlist, so updates carrying them ship a fresh userlist alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Chat,
    Join,
    Disconnect,
    Timeout,
    UserInfo,
    UserGroup,
    UserAction,
}

impl EventKind {
    /// Whether an update of this kind must include the room userlist.
    pub fn includes_userlist(&self) -> bool {
        !matches!(self, EventKind::Chat)
    }
}

/// Envelope published on room and user channels.
///
/// Serializes as `{"messages": [...]}` with an optional `users` array
/// appended when the update changes who is shown in the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomUpdate {
    pub messages: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<serde_json::Value>>,
}

impl RoomUpdate {
    pub fn new(messages: Vec<serde_json::Value>) -> Self {
        Self {
            messages,
            users: None,
        }
    }

    pub fn with_users(mut self, users: Vec<serde_json::Value>) -> Self {
        self.users = Some(users);
        self
    }
}
