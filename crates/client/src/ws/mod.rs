//! Real-time push connection and event routing.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │               ConnectionManager               │
//! │ (delayed connect, subscribe, reconnect policy)│
//! └───────────────────────────────────────────────┘
//!                         │ LinkEvent::Frame
//!                         ▼
//!              ┌─────────────────────┐
//!              │     EventRouter     │──── calendar-refresh ───▶ RefreshSignal
//!              └─────────────────────┘
//!                         │
//!          ┌──────────────┴──────────────┐
//!          ▼                             ▼
//!   ┌────────────┐               ┌─────────────────┐
//!   │ ChatStore  │               │NotificationStore│
//!   └────────────┘               └─────────────────┘
//!          │                             │
//!          └──────────────┬──────────────┘
//!                         ▼
//!              UI reads watch snapshots
//! ```
//!
//! UI code should read from the stores, not from connection events. The
//! router writes every inbound event to the appropriate store.

mod connection;
mod manager;
mod router;

pub use connection::{
    ConnectionState, Connector, DisconnectReason, Link, LinkEvent, ReconnectPolicy,
};
#[cfg(not(target_arch = "wasm32"))]
pub use connection::NativeConnector;
pub use manager::ConnectionManager;
pub use router::{Dispatch, EventRouter, Handler, RefreshSignal, RouteTargets};
