//! Session client configuration from environment variables.

use std::time::Duration;

use quizroom_shared::SessionCode;
use thiserror::Error;
use url::Url;

use crate::ws::ReconnectConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: invalid number '{value}'")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var}: invalid URL '{value}': {reason}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{var}: unknown poll mode '{value}' (expected fallback or continuous)")]
    InvalidPollMode { var: &'static str, value: String },
}

/// When the status poller runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollMode {
    /// Poll only while the push channel is not connected.
    #[default]
    Fallback,
    /// Poll at the fixed interval regardless of channel health.
    Continuous,
}

impl PollMode {
    pub fn should_poll(self, state: &crate::ws::ConnectionState) -> bool {
        match self {
            PollMode::Fallback => !state.is_connected(),
            PollMode::Continuous => true,
        }
    }
}

/// Timing and endpoint settings for one session client.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the REST API, e.g. `http://localhost:8000`.
    pub api_base: String,
    /// Base URL of the push channel, e.g. `ws://localhost:8000`.
    pub ws_base: String,
    pub poll_interval: Duration,
    pub poll_mode: PollMode,
    /// Delay between the channel opening and the first roster request.
    pub settle_delay: Duration,
    /// Time `start_game` waits after handing the frame to the transport.
    pub flush_delay: Duration,
    /// Limit on one push channel handshake; a handshake that runs over
    /// counts as a failed attempt.
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            ws_base: "ws://localhost:8000".to_string(),
            poll_interval: Duration::from_millis(3000),
            poll_mode: PollMode::Fallback,
            settle_delay: Duration::from_millis(100),
            flush_delay: Duration::from_millis(200),
            connect_timeout: Duration::from_millis(10_000),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `QUIZROOM_API_BASE`: REST base URL (default: "http://localhost:8000")
    /// - `QUIZROOM_WS_BASE`: push channel base URL (default: derived from the API base)
    /// - `QUIZROOM_POLL_INTERVAL_MS`: status poll interval (default: 3000)
    /// - `QUIZROOM_POLL_MODE`: "fallback" | "continuous" (default: "fallback")
    /// - `QUIZROOM_SETTLE_DELAY_MS`: delay before the first roster request (default: 100)
    /// - `QUIZROOM_FLUSH_DELAY_MS`: start_game flush window (default: 200)
    /// - `QUIZROOM_CONNECT_TIMEOUT_MS`: push channel handshake limit (default: 10000)
    /// - `QUIZROOM_RECONNECT_MAX_ATTEMPTS`: 0 for unlimited (default: 10)
    /// - `QUIZROOM_RECONNECT_INITIAL_MS`: first backoff delay (default: 1000)
    /// - `QUIZROOM_RECONNECT_MAX_MS`: backoff cap (default: 30000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(api_base) = lookup("QUIZROOM_API_BASE") {
            validate_url("QUIZROOM_API_BASE", &api_base)?;
            config.ws_base = derive_ws_base(&api_base);
            config.api_base = api_base;
        }
        if let Some(ws_base) = lookup("QUIZROOM_WS_BASE") {
            validate_url("QUIZROOM_WS_BASE", &ws_base)?;
            config.ws_base = ws_base;
        }
        if let Some(ms) = parse_u64(&lookup, "QUIZROOM_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(mode) = lookup("QUIZROOM_POLL_MODE") {
            config.poll_mode = match mode.trim().to_lowercase().as_str() {
                "fallback" => PollMode::Fallback,
                "continuous" => PollMode::Continuous,
                _ => {
                    return Err(ConfigError::InvalidPollMode {
                        var: "QUIZROOM_POLL_MODE",
                        value: mode,
                    })
                }
            };
        }
        if let Some(ms) = parse_u64(&lookup, "QUIZROOM_SETTLE_DELAY_MS")? {
            config.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64(&lookup, "QUIZROOM_FLUSH_DELAY_MS")? {
            config.flush_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64(&lookup, "QUIZROOM_CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(n) = parse_u64(&lookup, "QUIZROOM_RECONNECT_MAX_ATTEMPTS")? {
            config.reconnect.max_attempts = u32::try_from(n).unwrap_or(u32::MAX);
        }
        if let Some(ms) = parse_u64(&lookup, "QUIZROOM_RECONNECT_INITIAL_MS")? {
            config.reconnect.initial_delay_ms = ms;
        }
        if let Some(ms) = parse_u64(&lookup, "QUIZROOM_RECONNECT_MAX_MS")? {
            config.reconnect.max_delay_ms = ms;
        }

        Ok(config)
    }

    /// Status endpoint for a session.
    pub fn status_path(code: &SessionCode) -> String {
        format!(
            "/api/sessions/{}/status",
            urlencoding::encode(code.as_str())
        )
    }

    /// Push channel endpoint for a session.
    pub fn ws_url(&self, code: &SessionCode) -> String {
        format!(
            "{}/ws/sessions/{}",
            self.ws_base.trim_end_matches('/'),
            urlencoding::encode(code.as_str())
        )
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

fn validate_url(var: &'static str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value).map(|_| ()).map_err(|e| ConfigError::InvalidUrl {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// `http://host` becomes `ws://host`, `https://host` becomes `wss://host`.
fn derive_ws_base(api_base: &str) -> String {
    if let Some(rest) = api_base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = SyncConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(3000));
        assert_eq!(config.settle_delay, Duration::from_millis(100));
        assert_eq!(config.flush_delay, Duration::from_millis(200));
        assert_eq!(config.connect_timeout, Duration::from_millis(10_000));
        assert_eq!(config.poll_mode, PollMode::Fallback);
        assert_eq!(config.reconnect.max_attempts, 10);
    }

    #[test]
    fn ws_base_follows_api_scheme() {
        let config =
            SyncConfig::from_lookup(lookup_from(&[("QUIZROOM_API_BASE", "https://quiz.example")]))
                .unwrap();
        assert_eq!(config.ws_base, "wss://quiz.example");

        let config = SyncConfig::from_lookup(lookup_from(&[
            ("QUIZROOM_API_BASE", "https://quiz.example"),
            ("QUIZROOM_WS_BASE", "ws://push.example:9000"),
        ]))
        .unwrap();
        assert_eq!(config.ws_base, "ws://push.example:9000");
    }

    #[test]
    fn rejects_bad_values() {
        let err = SyncConfig::from_lookup(lookup_from(&[("QUIZROOM_POLL_INTERVAL_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));

        let err =
            SyncConfig::from_lookup(lookup_from(&[("QUIZROOM_POLL_MODE", "sometimes")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPollMode { .. }));

        let err = SyncConfig::from_lookup(lookup_from(&[("QUIZROOM_API_BASE", "not a url")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn parses_timings_and_mode() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("QUIZROOM_POLL_MODE", "Continuous"),
            ("QUIZROOM_FLUSH_DELAY_MS", "350"),
            ("QUIZROOM_CONNECT_TIMEOUT_MS", "2500"),
            ("QUIZROOM_RECONNECT_MAX_ATTEMPTS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.poll_mode, PollMode::Continuous);
        assert_eq!(config.flush_delay, Duration::from_millis(350));
        assert_eq!(config.connect_timeout, Duration::from_millis(2500));
        assert_eq!(config.reconnect.max_attempts, 0);
    }

    #[test]
    fn endpoints_encode_the_session_code() {
        let code = SessionCode::new("AB 12").unwrap();
        let config = SyncConfig::default();
        assert_eq!(SyncConfig::status_path(&code), "/api/sessions/AB%2012/status");
        assert_eq!(config.ws_url(&code), "ws://localhost:8000/ws/sessions/AB%2012");
    }
}
