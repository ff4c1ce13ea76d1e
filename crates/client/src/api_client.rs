//! HTTP client for the session REST API.

use std::time::Duration;

use async_trait::async_trait;
use quizroom_shared::{ApiError, GameStatus, SessionCode};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::config::SyncConfig;
use crate::poller::StatusSource;

/// HTTP client for session status requests.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Option<Duration>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            timeout: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Give up on a request after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
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

    /// Make a GET request and decode the JSON body
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let url = self.url(path);
        let mut rb = self.client.get(&url).header("Accept", "application/json");
        if let Some(timeout) = self.timeout {
            rb = rb.timeout(timeout);
        }

        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Current status of a session.
    pub async fn get_session_status(&self, code: &SessionCode) -> Result<GameStatus, ApiError> {
        self.get_json(&SyncConfig::status_path(code)).await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, code: &SessionCode) -> Result<GameStatus, ApiError> {
        self.get_session_status(code).await
    }
}
