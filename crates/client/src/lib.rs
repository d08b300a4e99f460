//! Fieldhouse client sync core.
//!
//! Keeps the chat cache and notification feed of a sports-management client
//! in step with the platform: a push connection feeds an event router, the
//! router writes to in-memory stores, and UI reads store snapshots.

pub mod api_client;
pub mod config;
pub mod logging;
pub mod stores;
pub mod ws;

pub use api_client::ApiClient;
pub use config::ClientConfig;
pub use stores::{ChatStore, HistoryMerge, NewMessage, NotificationStore};
pub use ws::{ConnectionManager, ConnectionState, EventRouter};
