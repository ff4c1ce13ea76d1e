//! Shared error types including RFC7807 Problem Details.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RFC7807 Problem Details (application/problem+json)
///
/// Session servers may answer failed status requests with this envelope;
/// the client lifts `detail` or `title` into its logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type", default)]
    pub type_url: Option<String>,
    /// A short, human-readable summary of the problem type.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: Option<u16>,
    /// Human-readable explanation specific to this occurrence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Attempt to parse an RFC7807 (or RFC7807-ish) JSON body into a user-facing message.
/// Prefers `detail`, falls back to `title`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ProblemDetails>(body).ok()?;
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    if !parsed.title.trim().is_empty() {
        return Some(parsed.title);
    }
    None
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// Short message for logs, using the problem document when there is one.
    pub fn summary(&self) -> String {
        match self {
            ApiError::Http { status, body } => match try_problem_detail(body) {
                Some(detail) => format!("HTTP {status}: {detail}"),
                None => self.to_string(),
            },
            _ => self.to_string(),
        }
    }
}

/// A push-channel frame that could not be decoded or encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionCodeError {
    #[error("session code must not be empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_detail_prefers_detail() {
        let body = r#"{"type":"about:blank","title":"Not Found","status":404,"detail":"No session ABC"}"#;
        assert_eq!(try_problem_detail(body).as_deref(), Some("No session ABC"));
    }

    #[test]
    fn problem_detail_falls_back_to_title() {
        let body = r#"{"title":"Gone","detail":"  "}"#;
        assert_eq!(try_problem_detail(body).as_deref(), Some("Gone"));
        assert_eq!(try_problem_detail("<html>"), None);
    }

    #[test]
    fn http_summary_uses_problem_document() {
        let err = ApiError::Http {
            status: 404,
            body: r#"{"title":"Not Found","detail":"No session ABC"}"#.to_string(),
        };
        assert_eq!(err.summary(), "HTTP 404: No session ABC");
        let plain = ApiError::Http {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(plain.summary(), "HTTP 502: bad gateway");
    }
}
