//! Error types shared across the sync core.

use thiserror::Error;

/// Transport-level failures. These are the only errors surfaced to the UI,
/// as their `Display` text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("reconnection failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
    #[error("not connected")]
    NotConnected,
    #[error("connection manager has been torn down")]
    TornDown,
    #[error("connect cancelled by disconnect")]
    Cancelled,
}

/// A push frame or payload the router could not use. Logged and dropped,
/// never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("malformed `{event}` payload: {reason}")]
    MalformedPayload { event: String, reason: String },
}

impl EventError {
    pub fn payload(event: &str, reason: impl Into<String>) -> Self {
        EventError::MalformedPayload {
            event: event.to_string(),
            reason: reason.into(),
        }
    }
}

/// API error type for the REST hydration client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

/// Pull a user-facing message out of a JSON error body.
/// Prefers `message`, then `detail`, then `title`.
pub fn try_error_message(body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "detail", "title"]
        .iter()
        .filter_map(|field| parsed.get(*field).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}
