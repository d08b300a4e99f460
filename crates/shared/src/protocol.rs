//! Wire protocol for the push connection.
//!
//! Outbound frames are [`WsEnvelope`]s around a [`ClientCommand`]. Inbound
//! frames are `{ "type": <event name>, "data": <payload> }`; payloads stay as
//! raw JSON until the event router picks them apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// Channels subscribed to right after the connection opens.
pub const DEFAULT_CHANNELS: [&str; 4] = ["calendar", "matches", "training", "system"];

/// Inbound event names.
pub mod events {
    pub const CALENDAR_EVENT_CREATED: &str = "calendar:event-created";
    pub const CALENDAR_EVENT_UPDATED: &str = "calendar:event-updated";
    pub const CALENDAR_EVENT_CANCELLED: &str = "calendar:event-cancelled";
    pub const CALENDAR_EVENT_REMINDER: &str = "calendar:event-reminder";
    pub const CALENDAR_REFRESH: &str = "calendar-refresh";

    pub const MATCH_SCHEDULED: &str = "match:scheduled";
    pub const MATCH_UPDATED: &str = "match:updated";
    pub const MATCH_CANCELLED: &str = "match:cancelled";
    pub const MATCH_REMINDER: &str = "match:reminder";

    pub const TRAINING_SCHEDULED: &str = "training:scheduled";
    pub const TRAINING_REMINDER: &str = "training:reminder";

    pub const SYSTEM_MAINTENANCE: &str = "system:maintenance";
    pub const SYSTEM_UPDATE: &str = "system:update";

    pub const WEBHOOK_NOTIFICATION: &str = "webhook:notification";

    pub const MESSAGE_RECEIVED: &str = "message:received";
    pub const CHAT_CREATED: &str = "chat:created";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl<T> WsEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
            correlation_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    Subscribe { channels: Vec<String> },
    Unsubscribe { channels: Vec<String> },
}

impl ClientCommand {
    pub fn subscribe<S: AsRef<str>>(channels: &[S]) -> Self {
        ClientCommand::Subscribe {
            channels: channels.iter().map(|c| c.as_ref().to_string()).collect(),
        }
    }
}

/// One decoded inbound frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
}

impl InboundFrame {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
            ts: None,
        }
    }

    pub fn parse(text: &str) -> Result<Self, EventError> {
        serde_json::from_str(text).map_err(|e| EventError::MalformedFrame(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
