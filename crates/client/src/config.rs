//! Client configuration from environment variables.

use std::time::Duration;

use fieldhouse_shared::{MonthKey, DEFAULT_CHANNELS};

use crate::stores::HistoryMerge;
use crate::ws::ReconnectPolicy;

/// Delay before the first connect attempt after startup.
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Push connection endpoint (`ws://` or `wss://`)
    pub ws_url: String,
    /// Base URL for REST hydration
    pub api_url: String,
    /// Bearer token for REST and the push connection, if any
    pub token: Option<String>,
    pub connect_delay: Duration,
    pub channels: Vec<String>,
    pub reconnect: ReconnectPolicy,
    pub month_key: MonthKey,
    pub history_merge: HistoryMerge,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:5000/ws".to_string(),
            api_url: "http://localhost:5000".to_string(),
            token: None,
            connect_delay: DEFAULT_CONNECT_DELAY,
            channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
            reconnect: ReconnectPolicy::default(),
            month_key: MonthKey::default(),
            history_merge: HistoryMerge::default(),
        }
    }
}

impl ClientConfig {
    /// Build configuration from the process environment.
    ///
    /// Environment variables:
    /// - `FIELDHOUSE_WS_URL`: push endpoint (default: "ws://localhost:5000/ws")
    /// - `FIELDHOUSE_API_URL`: REST base URL (default: "http://localhost:5000")
    /// - `FIELDHOUSE_TOKEN`: bearer token (default: none)
    /// - `FIELDHOUSE_CONNECT_DELAY_MS`: delay before the first connect (default: 1000)
    /// - `FIELDHOUSE_CHANNELS`: comma-separated channel list
    /// - `FIELDHOUSE_RECONNECT_MAX_ATTEMPTS`: 0 = retry forever (default: 10)
    /// - `FIELDHOUSE_MONTH_KEY`: "zero" | "one" (default: "zero")
    /// - `FIELDHOUSE_HISTORY_DEDUPE`: "true" to drop already-known ids on history merge
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("FIELDHOUSE_WS_URL") {
            config.ws_url = url;
        }
        if let Some(url) = lookup("FIELDHOUSE_API_URL") {
            config.api_url = url;
        }
        config.token = lookup("FIELDHOUSE_TOKEN").filter(|t| !t.trim().is_empty());

        if let Some(ms) = lookup("FIELDHOUSE_CONNECT_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
            config.connect_delay = Duration::from_millis(ms);
        }
        if let Some(channels) = lookup("FIELDHOUSE_CHANNELS") {
            let parsed: Vec<String> = channels
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            if !parsed.is_empty() {
                config.channels = parsed;
            }
        }
        if let Some(max) =
            lookup("FIELDHOUSE_RECONNECT_MAX_ATTEMPTS").and_then(|v| v.parse::<u32>().ok())
        {
            config.reconnect.max_attempts = max;
        }
        if let Some(key) = lookup("FIELDHOUSE_MONTH_KEY").as_deref().and_then(MonthKey::parse) {
            config.month_key = key;
        }
        if lookup("FIELDHOUSE_HISTORY_DEDUPE").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            config.history_merge = HistoryMerge::DedupeById;
        }

        config
    }

    /// Push URL with the bearer token appended as a `token` query parameter.
    pub fn ws_url_with_token(&self) -> String {
        match &self.token {
            Some(token) => match url::Url::parse(&self.ws_url) {
                Ok(mut url) => {
                    url.query_pairs_mut().append_pair("token", token);
                    url.to_string()
                }
                Err(_) => self.ws_url.clone(),
            },
            None => self.ws_url.clone(),
        }
    }
}
