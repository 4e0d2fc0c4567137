//! Realtime error taxonomy and RFC7807 Problem Details parsing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Handshake or transport failure. Recoverable: the caller may connect again.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("handshake timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// The attempt was overtaken by a `disconnect()` before it completed.
    #[error("connection attempt aborted by disconnect")]
    Aborted,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors raised by a transport implementation while opening a channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("{0}")]
    Handshake(String),
}

impl From<TransportError> for ConnectionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidEndpoint(e) => ConnectionError::Transport(e),
            TransportError::Handshake(e) => ConnectionError::Handshake(e),
        }
    }
}

/// A malformed inbound frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed frame ({reason})")]
pub struct DecodeError {
    pub reason: String,
    /// Leading characters of the rejected frame
    pub preview: String,
}

/// Failure reported by (or caught from) a single message observer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObserverError {
    #[error("{0}")]
    Failed(String),
    #[error("observer panicked: {0}")]
    Panicked(String),
}

impl ObserverError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ObserverError::Failed(msg.into())
    }
}

/// An outbound command that was dropped because the session was not connected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Could not send {what}: {reason}")]
pub struct SendRejected {
    pub what: String,
    pub reason: String,
}

/// RFC7807 Problem Details (application/problem+json)
///
/// HTTP failures reported by the surrounding application usually carry this
/// body, so notices built from them can show the server's own wording.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type", default)]
    pub type_url: String,
    /// A short, human-readable summary of the problem type.
    #[serde(default)]
    pub title: String,
    /// HTTP status code.
    #[serde(default)]
    pub status: Option<u16>,
    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// A URI reference that identifies the specific occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_detail_prefers_detail() {
        let body = r#"{"type":"about:blank","title":"Unauthorized","status":401,"detail":"Token expired"}"#;
        assert_eq!(try_problem_detail(body).as_deref(), Some("Token expired"));
    }

    #[test]
    fn problem_detail_falls_back_to_title() {
        let body = r#"{"type":"about:blank","title":"Forbidden","status":403,"detail":"   "}"#;
        assert_eq!(try_problem_detail(body).as_deref(), Some("Forbidden"));
        assert_eq!(try_problem_detail("<html>oops</html>"), None);
        assert_eq!(try_problem_detail(r#"{"title":""}"#), None);
    }

    #[test]
    fn transport_errors_map_into_connection_errors() {
        assert_eq!(
            ConnectionError::from(TransportError::Handshake("401".into())),
            ConnectionError::Handshake("401".into())
        );
        assert!(matches!(
            ConnectionError::from(TransportError::InvalidEndpoint("bad".into())),
            ConnectionError::Transport(_)
        ));
    }

    #[test]
    fn messages_read_naturally() {
        let rejected = SendRejected {
            what: "chat message \"bye\"".into(),
            reason: "not connected".into(),
        };
        assert_eq!(rejected.to_string(), "Could not send chat message \"bye\": not connected");
        assert_eq!(
            ConnectionError::Timeout(Duration::from_millis(5000)).to_string(),
            "handshake timed out after 5000ms"
        );
    }
}
