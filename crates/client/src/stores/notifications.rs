//! Notifications derived from push events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fieldhouse_shared::{IdGenerator, Notification, Severity};
use serde_json::Value;
use tokio::sync::watch;

/// Oldest entries are dropped beyond this many.
pub const MAX_NOTIFICATIONS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredNotification {
    pub id: String,
    pub notification: Notification,
    pub received_at: DateTime<Utc>,
    pub read: bool,
}

/// Newest-first list of received notifications.
pub struct NotificationStore {
    state: watch::Sender<Arc<Vec<StoredNotification>>>,
    ids: IdGenerator,
}

impl NotificationStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            state,
            ids: IdGenerator::with_prefix("notification"),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<StoredNotification>> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<StoredNotification>>> {
        self.state.subscribe()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.state.borrow().iter().filter(|n| !n.read).count()
    }

    /// Store a notification and return its local id.
    pub fn push(&self, notification: Notification) -> String {
        let id = self.ids.next_id();
        crate::log_info!(
            "notification [{:?}] {}: {}",
            notification.severity,
            notification.title,
            notification.message
        );
        let stored = StoredNotification {
            id: id.clone(),
            notification,
            received_at: Utc::now(),
            read: false,
        };
        self.state.send_modify(|list| {
            let mut next = Vec::with_capacity((list.len() + 1).min(MAX_NOTIFICATIONS));
            next.push(stored);
            next.extend(list.iter().take(MAX_NOTIFICATIONS - 1).cloned());
            *list = Arc::new(next);
        });
        id
    }

    /// Accept an opaque webhook payload, reading known fields leniently.
    pub fn handle_webhook(&self, payload: &Value) -> String {
        let text = |field: &str| payload.get(field).and_then(Value::as_str).map(str::to_string);

        let notification = Notification {
            title: text("title").unwrap_or_else(|| "Notification".to_string()),
            message: text("message").or_else(|| text("body")).unwrap_or_default(),
            severity: text("severity")
                .map(|s| Severity::parse_lenient(&s))
                .unwrap_or_default(),
            source: text("source").unwrap_or_else(|| "webhook".to_string()),
            source_id: text("sourceId"),
            action_url: text("actionUrl"),
            metadata: payload.get("metadata").cloned().unwrap_or(Value::Null),
        };
        self.push(notification)
    }

    pub fn mark_read(&self, id: &str) -> bool {
        self.update(|list| {
            let index = list.iter().position(|n| n.id == id && !n.read)?;
            let mut next = list.clone();
            next[index].read = true;
            Some(next)
        })
    }

    pub fn mark_all_read(&self) -> bool {
        self.update(|list| {
            if list.iter().all(|n| n.read) {
                return None;
            }
            Some(
                list.iter()
                    .cloned()
                    .map(|mut n| {
                        n.read = true;
                        n
                    })
                    .collect(),
            )
        })
    }

    pub fn dismiss(&self, id: &str) -> bool {
        self.update(|list| {
            let index = list.iter().position(|n| n.id == id)?;
            let mut next = list.clone();
            next.remove(index);
            Some(next)
        })
    }

    pub fn clear(&self) {
        self.update(|list| (!list.is_empty()).then(Vec::new));
    }

    fn update(
        &self,
        f: impl FnOnce(&Vec<StoredNotification>) -> Option<Vec<StoredNotification>>,
    ) -> bool {
        self.state.send_if_modified(|list| match f(list) {
            Some(next) => {
                *list = Arc::new(next);
                true
            }
            None => false,
        })
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}
