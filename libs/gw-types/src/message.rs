use serde::{Deserialize, Serialize};

use crate::jid::is_group_jid;

/// Discriminant tag carried on every normalized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Contact,
    /// Any upstream type this gateway does not special-case. The raw tag is
    /// preserved on `MessageContent::Unhandled`.
    Other,
}

/// Tagged content payload, keyed by `MessageType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageContent {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context_info: Option<serde_json::Value>,
    },
    Media {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mimetype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seconds: Option<u32>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Contact {
        display_name: String,
        vcard: String,
    },
    /// Unknown upstream message type, passed through opaquely.
    Unhandled { raw_type: String },
}

/// The normalized, in-memory representation of one upstream chat message.
///
/// This is the only place upstream field names and shapes are dealt with;
/// everywhere else in the gateway operates on `MessageInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    /// Opaque id assigned by the upstream network, globally unique per account.
    pub id: String,
    /// Addressable identifier of the chat (individual or group).
    pub from: String,
    pub from_me: bool,
    /// Seconds since epoch.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    pub content: MessageContent,
}

impl MessageInfo {
    /// Derived from `from`: whether this message belongs to a group chat.
    pub fn is_group(&self) -> bool {
        is_group_jid(&self.from)
    }
}
