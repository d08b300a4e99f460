//! In-memory stores for the sync core.
//!
//! Stores are plain service objects: construct one per session, share it
//! behind an `Arc`, and subscribe to its `watch` channel for snapshots.

pub mod chats;
pub mod notifications;

pub use chats::{ChatList, ChatStore, HistoryMerge, NewMessage};
pub use notifications::{NotificationStore, StoredNotification, MAX_NOTIFICATIONS};
