//! The persistent store (component G): idempotent chat/message upserts,
//! conversation and message queries, and per-tenant configuration.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use gw_types::{BusinessInfo, Chat, ChatPatch, IngestRecord, MessageInfo, TenantConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("failed to (de)serialize stored value: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Pagination anchor for upstream history backfill: the oldest locally
/// stored message of a chat.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageAnchor {
    pub id: String,
    pub jid: String,
    pub from_me: bool,
    pub timestamp: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_chat(&self, jid: &str, patch: ChatPatch) -> Result<(), StoreError>;
    async fn upsert_chats(&self, chats: Vec<Chat>) -> Result<(), StoreError>;

    /// Upserts the owning chat, then inserts the message. Duplicate ids are
    /// a no-op.
    async fn save_message(&self, record: &IngestRecord) -> Result<(), StoreError>;

    /// Transactional batch form of [`save_message`](Self::save_message).
    /// Either every record in `records` is durably applied, or none are.
    async fn save_messages_batch(&self, records: &[IngestRecord]) -> Result<(), StoreError>;

    async fn list_conversations(
        &self,
        limit: u32,
        cursor: Option<i64>,
    ) -> Result<Vec<Chat>, StoreError>;

    async fn list_messages(
        &self,
        jid: &str,
        limit: u32,
        cursor: Option<i64>,
    ) -> Result<Vec<MessageInfo>, StoreError>;

    async fn get_oldest_message_anchor(
        &self,
        jid: &str,
    ) -> Result<Option<MessageAnchor>, StoreError>;

    async fn ping(&self) -> Result<bool, StoreError>;

    async fn get_tenant_config(&self, username: &str) -> Result<Option<TenantConfig>, StoreError>;
    async fn upsert_tenant_config(&self, config: &TenantConfig) -> Result<(), StoreError>;

    async fn get_business_info(&self, username: &str) -> Result<BusinessInfo, StoreError>;
    async fn save_business_info(
        &self,
        username: &str,
        info: &BusinessInfo,
    ) -> Result<(), StoreError>;

    async fn get_excluded_numbers(&self, username: &str) -> Result<Vec<String>, StoreError>;
    async fn set_excluded_numbers(
        &self,
        username: &str,
        numbers: Vec<String>,
    ) -> Result<(), StoreError>;
}
