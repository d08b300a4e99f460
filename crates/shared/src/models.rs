//! Data models for the chat cache and push notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::group::MessageGroup;

// --- Identity ---

/// A chat participant as returned by the platform API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            avatar: None,
        }
    }
}

// --- Chats ---

/// A conversation and its cached, date-bucketed messages.
///
/// `messages` and `init` are client-side state only; they are never part of
/// the wire representation and start empty whenever a chat is hydrated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub is_group_chat: bool,
    #[serde(default)]
    pub chat_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Preview text of the newest known message
    #[serde(default)]
    pub latest_message: Option<String>,
    #[serde(default)]
    pub latest_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latest_message_sender: Option<String>,
    #[serde(skip)]
    pub messages: MessageGroup,
    /// Whether a page of history has been merged at least once.
    #[serde(skip)]
    pub init: bool,
}

impl Chat {
    /// A direct (non-group) chat between the given participants.
    pub fn direct(id: impl Into<String>, users: Vec<User>) -> Self {
        Self {
            id: id.into(),
            users,
            is_group_chat: false,
            chat_name: String::new(),
            created_at: Some(Utc::now()),
            updated_at: None,
            latest_message: None,
            latest_message_at: None,
            latest_message_sender: None,
            messages: MessageGroup::default(),
            init: false,
        }
    }

    pub fn has_user(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u.id == user_id)
    }

    pub fn find_user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    /// Copy of this chat with empty message state, as after a fresh hydration.
    pub fn reset(mut self) -> Self {
        self.messages = MessageGroup::default();
        self.init = false;
        self
    }

    /// Refresh the denormalized preview fields if `message` is at least as new
    /// as the current preview.
    pub fn touch_preview(&mut self, message: &Message) {
        let newer = self
            .latest_message_at
            .map_or(true, |at| message.created_at >= at);
        if newer {
            self.latest_message = Some(message.content.clone());
            self.latest_message_at = Some(message.created_at);
            self.latest_message_sender = message.sender.as_ref().map(|s| s.id.clone());
        }
    }
}

/// Back-reference from a message to the chat that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRef {
    #[serde(rename = "_id")]
    pub id: String,
}

impl ChatRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

// --- Messages ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    /// `None` when the sender could not be resolved among the chat's users.
    #[serde(default)]
    pub sender: Option<User>,
    pub chat: ChatRef,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub receivers: Vec<String>,
}

// --- Notifications ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Lenient parse used for opaque webhook payloads; unknown values are `Info`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Severity::Success,
            "warning" | "warn" => Severity::Warning,
            "error" | "critical" => Severity::Error,
            _ => Severity::Info,
        }
    }
}

/// A user-facing notification derived from a push event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_deserializes_wire_shape_with_empty_cache() {
        let chat: Chat = serde_json::from_value(json!({
            "_id": "c1",
            "users": [{"_id": "u1", "name": "Ana"}, {"_id": "u2", "name": "Ben"}],
            "isGroupChat": false,
            "chatName": "sender",
            "latestMessage": "see you at practice",
        }))
        .unwrap();

        assert_eq!(chat.id, "c1");
        assert_eq!(chat.users.len(), 2);
        assert!(chat.has_user("u2"));
        assert!(!chat.is_group_chat);
        assert!(chat.messages.is_empty());
        assert!(!chat.init);
        assert_eq!(chat.latest_message.as_deref(), Some("see you at practice"));
    }

    #[test]
    fn message_without_sender_deserializes() {
        let message: Message = serde_json::from_value(json!({
            "_id": "m1",
            "content": "hello",
            "chat": {"_id": "c1"},
            "createdAt": "2024-03-05T10:00:00Z",
        }))
        .unwrap();

        assert!(message.sender.is_none());
        assert_eq!(message.chat.id, "c1");
        assert!(message.read_by.is_empty());
    }

    #[test]
    fn direct_chat_is_unnamed_and_empty() {
        let chat = Chat::direct("c1", vec![User::new("u1", "Ana"), User::new("u2", "Ben")]);
        assert!(!chat.is_group_chat);
        assert!(chat.chat_name.is_empty());
        assert!(chat.messages.is_empty());
        assert!(chat.has_user("u2"));
    }

    #[test]
    fn preview_only_moves_forward() {
        let mut chat = Chat::direct("c1", vec![User::new("u1", "Ana")]);
        let newer: Message = serde_json::from_value(json!({
            "_id": "m2", "content": "late", "chat": {"_id": "c1"},
            "createdAt": "2024-03-05T12:00:00Z",
        }))
        .unwrap();
        let older: Message = serde_json::from_value(json!({
            "_id": "m1", "content": "early", "chat": {"_id": "c1"},
            "createdAt": "2024-03-05T09:00:00Z",
        }))
        .unwrap();

        chat.touch_preview(&newer);
        chat.touch_preview(&older);
        assert_eq!(chat.latest_message.as_deref(), Some("late"));
    }

    #[test]
    fn severity_parse_is_lenient() {
        assert_eq!(Severity::parse_lenient("WARNING"), Severity::Warning);
        assert_eq!(Severity::parse_lenient("critical"), Severity::Error);
        assert_eq!(Severity::parse_lenient("whatever"), Severity::Info);
    }
}
