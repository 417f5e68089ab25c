use serde::{Deserialize, Serialize};

/// A persisted chat row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub jid: String,
    #[serde(default)]
    pub name: Option<String>,
    pub is_group: bool,
    #[serde(default)]
    pub unread_count: i64,
    #[serde(default)]
    pub last_message_timestamp: Option<i64>,
    #[serde(default)]
    pub last_message_text: Option<String>,
}

impl Chat {
    pub fn new(jid: impl Into<String>, is_group: bool) -> Self {
        Self {
            jid: jid.into(),
            name: None,
            is_group,
            unread_count: 0,
            last_message_timestamp: None,
            last_message_text: None,
        }
    }
}

/// Partial update applied with merge (only `Some` fields overwrite).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: Option<bool>,
    #[serde(default)]
    pub unread_count: Option<i64>,
    #[serde(default)]
    pub last_message_timestamp: Option<i64>,
    #[serde(default)]
    pub last_message_text: Option<String>,
}
