//! Realtime wire protocol: outbound frames and inbound decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::models::{Availability, MessageEnvelope};

/// Longest slice of a rejected frame kept for diagnostics
const PREVIEW_CHARS: usize = 64;

/// Outbound frame wrapper. The payload is flattened, so a chat command goes
/// out as `{"id": "...", "kind": "chat", "text": "...", "replyTo": null, "ts": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl<T> WsEnvelope<T> {
    /// Wrap a payload with a fresh id and the current timestamp
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClientCommand {
    Chat {
        text: String,
        #[serde(rename = "replyTo")]
        reply_to: Option<String>,
    },
    Typing {
        active: bool,
    },
    Presence {
        status: Availability,
    },
}

impl ClientCommand {
    pub fn chat(text: impl Into<String>, reply_to: Option<&str>) -> Self {
        ClientCommand::Chat {
            text: text.into(),
            reply_to: reply_to.map(str::to_string),
        }
    }

    /// Wire name of the discriminant
    pub fn kind(&self) -> &'static str {
        match self {
            ClientCommand::Chat { .. } => "chat",
            ClientCommand::Typing { .. } => "typing",
            ClientCommand::Presence { .. } => "presence",
        }
    }

    /// Short human-readable description, used in user-facing notices
    pub fn describe(&self) -> String {
        match self {
            ClientCommand::Chat { text, .. } => format!("chat message \"{}\"", text),
            ClientCommand::Typing { active: true } => "typing indicator".to_string(),
            ClientCommand::Typing { active: false } => "typing stop".to_string(),
            ClientCommand::Presence { status } => format!("presence update ({:?})", status),
        }
    }
}

/// Serialize an outbound frame to its JSON text form.
pub fn encode_frame<T: Serialize>(frame: &WsEnvelope<T>) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// Decode one inbound text frame into a [`MessageEnvelope`].
pub fn decode_envelope(text: &str) -> Result<MessageEnvelope, DecodeError> {
    serde_json::from_str(text).map_err(|e| DecodeError {
        reason: e.to_string(),
        preview: text.chars().take(PREVIEW_CHARS).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn chat_command_is_flattened_into_frame() {
        let frame = WsEnvelope::new(ClientCommand::chat("bye", Some("m1")));
        let json: Value = serde_json::from_str(&encode_frame(&frame).unwrap()).unwrap();

        assert_eq!(json["kind"], "chat");
        assert_eq!(json["text"], "bye");
        assert_eq!(json["replyTo"], "m1");
        assert_eq!(json["id"], frame.id.as_str());
        assert!(json.get("ts").is_some());
        assert!(json.get("correlationId").is_none());
    }

    #[test]
    fn reply_to_is_sent_as_null_when_absent() {
        let frame = WsEnvelope::new(ClientCommand::chat("hello", None)).with_correlation("c-1");
        let json: Value = serde_json::from_str(&encode_frame(&frame).unwrap()).unwrap();

        assert!(json["replyTo"].is_null());
        assert_eq!(json["correlationId"], "c-1");
    }

    #[test]
    fn frame_ids_are_unique() {
        let a = WsEnvelope::new(ClientCommand::Typing { active: true });
        let b = WsEnvelope::new(ClientCommand::Typing { active: true });
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn describe_carries_payload_context() {
        assert_eq!(
            ClientCommand::chat("bye", None).describe(),
            "chat message \"bye\""
        );
        assert_eq!(ClientCommand::Typing { active: false }.kind(), "typing");
    }

    #[test]
    fn malformed_frame_yields_decode_error_with_preview() {
        let err = decode_envelope("{not json").unwrap_err();
        assert_eq!(err.preview, "{not json");
        assert!(!err.reason.is_empty());

        let long = "x".repeat(500);
        let err = decode_envelope(&long).unwrap_err();
        assert_eq!(err.preview.len(), PREVIEW_CHARS);
    }
}
