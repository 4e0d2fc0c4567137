//! Inbound realtime message models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Messaging ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    /// Identifier of the message this one replies to
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Availability {
    Online,
    Away,
    Busy,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub user: String,
    pub status: Availability,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdate {
    pub user: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub nonce: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerError {
    pub code: String,
    pub message: String,
}

// --- WebSocket ---

/// One decoded inbound realtime event, tagged by `kind`.
///
/// ```json
/// {"kind": "chat", "text": "hi", "replyTo": null}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MessageEnvelope {
    Chat(ChatMessage),
    Presence(PresenceUpdate),
    Typing(TypingUpdate),
    Ack(Ack),
    Error(ServerError),
}

impl MessageEnvelope {
    /// Wire name of the discriminant
    pub fn kind(&self) -> &'static str {
        match self {
            MessageEnvelope::Chat(_) => "chat",
            MessageEnvelope::Presence(_) => "presence",
            MessageEnvelope::Typing(_) => "typing",
            MessageEnvelope::Ack(_) => "ack",
            MessageEnvelope::Error(_) => "error",
        }
    }

    pub fn as_chat(&self) -> Option<&ChatMessage> {
        match self {
            MessageEnvelope::Chat(chat) => Some(chat),
            _ => None,
        }
    }
}
