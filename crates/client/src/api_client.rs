//! HTTP client for the REST collaborators used at mount.

use fieldhouse_shared::{try_error_message, ApiError, Chat, Message};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::stores::ChatStore;

/// Fetches the chat list and message history used to hydrate [`ChatStore`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new()
            .with_base_url(config.api_url.clone())
            .with_token(config.token.clone())
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    /// Make an authenticated GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let url = self.url(path);
        let mut rb = self.client.get(&url);
        if let Some(token) = &self.token {
            rb = rb.bearer_auth(token);
        }

        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            let body = try_error_message(&text).unwrap_or(text);
            return Err(ApiError::Http { status, body });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// GET `/api/chat`
    pub async fn fetch_chats(&self) -> Result<Vec<Chat>, ApiError> {
        self.get_json("/api/chat").await
    }

    /// GET `/api/message/<chat_id>`: one page of history, oldest first.
    pub async fn fetch_messages(&self, chat_id: &str) -> Result<Vec<Message>, ApiError> {
        self.get_json(&format!("/api/message/{chat_id}")).await
    }

    /// Load the chat list, then one page of history per chat.
    ///
    /// The chat list replaces whatever the store held. A failed history fetch
    /// is logged and leaves that chat uninitialised; the rest still load.
    pub async fn hydrate(&self, store: &ChatStore) -> Result<usize, ApiError> {
        let chats = self.fetch_chats().await?;
        let ids: Vec<String> = chats.iter().map(|c| c.id.clone()).collect();
        store.set_chats(chats);

        let mut loaded = 0;
        for chat_id in ids {
            match self.fetch_messages(&chat_id).await {
                Ok(messages) => {
                    if store.add_messages(&chat_id, messages) {
                        loaded += 1;
                    }
                }
                Err(e) => crate::log_warn!("history for chat {} not loaded: {}", chat_id, e),
            }
        }
        crate::log_info!("hydrated {} chats with history", loaded);
        Ok(loaded)
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}
