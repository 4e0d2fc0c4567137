use chatline_shared::{try_problem_detail, SendRejected};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a publisher hands to the bus. The bus stamps it into a
/// [`NotificationEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub status: Option<u16>,
    /// Endpoint (URL or API path) the failure came from
    pub endpoint: Option<String>,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            endpoint: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Build a notice for a failed HTTP request. Uses the RFC7807 `detail` or
    /// `title` from the response body when present.
    pub fn from_http_failure(status: u16, endpoint: impl Into<String>, body: &str) -> Self {
        let message = try_problem_detail(body)
            .unwrap_or_else(|| format!("Request failed with status {}", status));
        Self::new(message).with_status(status).with_endpoint(endpoint)
    }
}

impl From<&str> for Notice {
    fn from(message: &str) -> Self {
        Notice::new(message)
    }
}

impl From<String> for Notice {
    fn from(message: String) -> Self {
        Notice::new(message)
    }
}

impl From<SendRejected> for Notice {
    fn from(rejected: SendRejected) -> Self {
        Notice::new(rejected.to_string())
    }
}

/// A sequenced notice. `seq` orders the delivery backlog and keys the view,
/// since messages may repeat verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub seq: u64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub(crate) fn stamp(seq: u64, notice: Notice) -> Self {
        Self {
            seq,
            message: notice.message,
            status: notice.status,
            endpoint: notice.endpoint,
            created_at: Utc::now(),
        }
    }
}
