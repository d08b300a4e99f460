//! Inbound event routing.
//!
//! Each push event name maps to one handler. A handler pulls the fields it
//! needs out of the raw JSON payload (with defaults where a field is
//! optional) and makes exactly one store call. Bad payloads are logged and
//! dropped here; nothing escapes [`EventRouter::dispatch`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use fieldhouse_shared::{events, Chat, EventError, InboundFrame, Message, Notification, Severity};
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;

use crate::stores::{ChatStore, NewMessage, NotificationStore};

/// Loose "something on the calendar changed" signal for UI outside the core.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSignal {
    pub payload: Value,
}

/// Result of routing one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Handled,
    /// No handler registered for this event name.
    Ignored,
    /// The payload was unusable; the event was dropped.
    Dropped(EventError),
}

/// What handlers act on.
pub struct RouteTargets {
    pub chats: Arc<ChatStore>,
    pub notifications: Arc<NotificationStore>,
    refresh: broadcast::Sender<RefreshSignal>,
}

pub type Handler = fn(&RouteTargets, &Value) -> Result<(), EventError>;

pub struct EventRouter {
    targets: RouteTargets,
    handlers: RwLock<HashMap<&'static str, Handler>>,
}

impl EventRouter {
    /// Router with the full default handler table registered.
    pub fn new(chats: Arc<ChatStore>, notifications: Arc<NotificationStore>) -> Self {
        let (refresh, _) = broadcast::channel(16);
        let router = Self {
            targets: RouteTargets {
                chats,
                notifications,
                refresh,
            },
            handlers: RwLock::new(HashMap::new()),
        };
        router.register_defaults();
        router
    }

    pub fn register_defaults(&self) {
        use events::*;

        let table: [(&'static str, Handler); 16] = [
            (CALENDAR_EVENT_CREATED, |t, p| calendar_event(t, p, CALENDAR_EVENT_CREATED, "created")),
            (CALENDAR_EVENT_UPDATED, |t, p| calendar_event(t, p, CALENDAR_EVENT_UPDATED, "updated")),
            (CALENDAR_EVENT_CANCELLED, |t, p| {
                calendar_event(t, p, CALENDAR_EVENT_CANCELLED, "cancelled")
            }),
            (CALENDAR_EVENT_REMINDER, |t, p| calendar_event(t, p, CALENDAR_EVENT_REMINDER, "reminder")),
            (CALENDAR_REFRESH, calendar_refresh),
            (MATCH_SCHEDULED, |t, p| match_event(t, p, MATCH_SCHEDULED, "scheduled")),
            (MATCH_UPDATED, |t, p| match_event(t, p, MATCH_UPDATED, "updated")),
            (MATCH_CANCELLED, |t, p| match_event(t, p, MATCH_CANCELLED, "cancelled")),
            (MATCH_REMINDER, |t, p| match_event(t, p, MATCH_REMINDER, "reminder")),
            (TRAINING_SCHEDULED, |t, p| training_event(t, p, TRAINING_SCHEDULED, "scheduled")),
            (TRAINING_REMINDER, |t, p| training_event(t, p, TRAINING_REMINDER, "reminder")),
            (SYSTEM_MAINTENANCE, |t, p| {
                system_event(t, p, SYSTEM_MAINTENANCE, "Scheduled maintenance", Severity::Warning)
            }),
            (SYSTEM_UPDATE, |t, p| system_event(t, p, SYSTEM_UPDATE, "System update", Severity::Info)),
            (WEBHOOK_NOTIFICATION, webhook),
            (MESSAGE_RECEIVED, message_received),
            (CHAT_CREATED, chat_created),
        ];

        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.extend(table);
    }

    pub fn register(&self, event: &'static str, handler: Handler) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(event, handler);
    }

    /// Remove every handler. Events routed afterwards are ignored.
    pub fn unregister_all(&self) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Receive `calendar-refresh` signals.
    pub fn subscribe_refresh(&self) -> broadcast::Receiver<RefreshSignal> {
        self.targets.refresh.subscribe()
    }

    pub fn chats(&self) -> &Arc<ChatStore> {
        &self.targets.chats
    }

    pub fn notifications(&self) -> &Arc<NotificationStore> {
        &self.targets.notifications
    }

    /// Decode a raw text frame and route it.
    pub fn dispatch_frame(&self, text: &str) -> Dispatch {
        match InboundFrame::parse(text) {
            Ok(frame) => self.dispatch(&frame.event, &frame.data),
            Err(err) => {
                crate::log_warn!("dropping inbound frame: {}", err);
                Dispatch::Dropped(err)
            }
        }
    }

    pub fn dispatch(&self, event: &str, payload: &Value) -> Dispatch {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .copied();
        let Some(handler) = handler else {
            crate::log_debug!("no handler for event {}", event);
            return Dispatch::Ignored;
        };

        match handler(&self.targets, payload) {
            Ok(()) => Dispatch::Handled,
            Err(err) => {
                crate::log_warn!("dropping event: {}", err);
                Dispatch::Dropped(err)
            }
        }
    }
}

// --- payload helpers ---

fn entity<'a>(payload: &'a Value, field: &str, event: &str) -> Result<&'a Map<String, Value>, EventError> {
    payload
        .get(field)
        .and_then(Value::as_object)
        .ok_or_else(|| EventError::payload(event, format!("missing `{field}` object")))
}

fn entity_id(entity: &Map<String, Value>) -> Option<String> {
    ["_id", "id"].iter().find_map(|key| match entity.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn text<'a>(entity: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    entity
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn time_until(payload: &Value) -> String {
    match payload.get("timeUntil") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => format!("{n} minutes"),
        _ => "soon".to_string(),
    }
}

// --- handlers ---

fn calendar_event(t: &RouteTargets, payload: &Value, event: &str, action: &str) -> Result<(), EventError> {
    let item = entity(payload, "event", event)?;
    let id = entity_id(item);
    let title = text(item, "title").unwrap_or("Untitled event");

    let (heading, message, severity) = match action {
        "created" => (
            "New calendar event",
            format!("\"{title}\" has been added to your calendar"),
            Severity::Info,
        ),
        "updated" => (
            "Calendar event updated",
            format!("\"{title}\" has been updated"),
            Severity::Info,
        ),
        "cancelled" => (
            "Calendar event cancelled",
            format!("\"{title}\" has been cancelled"),
            Severity::Warning,
        ),
        _ => (
            "Upcoming event",
            format!("\"{title}\" starts in {}", time_until(payload)),
            Severity::Info,
        ),
    };

    t.notifications.push(Notification {
        title: heading.to_string(),
        message,
        severity,
        source: "calendar".to_string(),
        action_url: id.as_ref().map(|id| format!("/calendar/{id}")),
        source_id: id,
        metadata: json!({ "action": action, "event": item }),
    });
    Ok(())
}

fn calendar_refresh(t: &RouteTargets, payload: &Value) -> Result<(), EventError> {
    // No receivers is fine; nobody is listening yet.
    let receivers = t
        .refresh
        .send(RefreshSignal {
            payload: payload.clone(),
        })
        .unwrap_or(0);
    crate::log_debug!("calendar refresh broadcast to {} listeners", receivers);
    Ok(())
}

fn match_event(t: &RouteTargets, payload: &Value, event: &str, action: &str) -> Result<(), EventError> {
    let item = entity(payload, "match", event)?;
    let id = entity_id(item);
    let name = match (text(item, "title"), text(item, "opponent")) {
        (Some(title), _) => title.to_string(),
        (None, Some(opponent)) => format!("Match vs {opponent}"),
        (None, None) => "Match".to_string(),
    };

    let (heading, message, severity) = match action {
        "scheduled" => (
            "Match scheduled",
            format!("{name} has been scheduled"),
            Severity::Info,
        ),
        "updated" => ("Match updated", format!("{name} has been updated"), Severity::Info),
        "cancelled" => (
            "Match cancelled",
            format!("{name} has been cancelled"),
            Severity::Warning,
        ),
        _ => (
            "Match reminder",
            format!("{name} starts in {}", time_until(payload)),
            Severity::Info,
        ),
    };

    t.notifications.push(Notification {
        title: heading.to_string(),
        message,
        severity,
        source: "match".to_string(),
        action_url: id.as_ref().map(|id| format!("/matches/{id}")),
        source_id: id,
        metadata: json!({ "action": action, "match": item }),
    });
    Ok(())
}

fn training_event(t: &RouteTargets, payload: &Value, event: &str, action: &str) -> Result<(), EventError> {
    let item = entity(payload, "training", event)?;
    let id = entity_id(item);
    let title = text(item, "title").unwrap_or("Training session");

    let (heading, message) = if action == "reminder" {
        (
            "Training reminder",
            format!("{title} starts in {}", time_until(payload)),
        )
    } else {
        let message = match text(item, "location") {
            Some(location) => format!("{title} has been scheduled at {location}"),
            None => format!("{title} has been scheduled"),
        };
        ("Training scheduled", message)
    };

    t.notifications.push(Notification {
        title: heading.to_string(),
        message,
        severity: Severity::Info,
        source: "training".to_string(),
        action_url: id.as_ref().map(|id| format!("/training/{id}")),
        source_id: id,
        metadata: json!({ "action": action, "training": item }),
    });
    Ok(())
}

fn system_event(
    t: &RouteTargets,
    payload: &Value,
    event: &str,
    heading: &str,
    severity: Severity,
) -> Result<(), EventError> {
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| EventError::payload(event, "missing `message`"))?;

    t.notifications.push(Notification {
        title: heading.to_string(),
        message: message.to_string(),
        severity,
        source: "system".to_string(),
        source_id: None,
        action_url: None,
        metadata: json!({ "event": event }),
    });
    Ok(())
}

fn webhook(t: &RouteTargets, payload: &Value) -> Result<(), EventError> {
    t.notifications.handle_webhook(payload);
    Ok(())
}

fn message_received(t: &RouteTargets, payload: &Value) -> Result<(), EventError> {
    let raw = payload.get("message").unwrap_or(payload);
    let message: Message = serde_json::from_value(raw.clone())
        .map_err(|e| EventError::payload(events::MESSAGE_RECEIVED, e.to_string()))?;
    t.chats.add_message(NewMessage::Confirmed(message));
    Ok(())
}

fn chat_created(t: &RouteTargets, payload: &Value) -> Result<(), EventError> {
    let raw = payload.get("chat").unwrap_or(payload);
    let chat: Chat = serde_json::from_value(raw.clone())
        .map_err(|e| EventError::payload(events::CHAT_CREATED, e.to_string()))?;
    t.chats.add_chat(chat);
    Ok(())
}
