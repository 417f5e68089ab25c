use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use gw_types::{
    is_group_jid, BusinessInfo, Chat, ChatPatch, IngestRecord, MessageContent, MessageInfo,
    TenantConfig, Webhook,
};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task::spawn_blocking;

use crate::{MessageAnchor, Store, StoreError};

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chats (
    jid TEXT PRIMARY KEY,
    name TEXT,
    is_group INTEGER,
    unread_count INTEGER,
    last_message_timestamp INTEGER,
    last_message_text TEXT
);
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    jid TEXT NOT NULL,
    from_me INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    payload_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS messages_jid_timestamp ON messages (jid, timestamp);
CREATE TABLE IF NOT EXISTS tenant_configs (
    username TEXT PRIMARY KEY,
    webhooks_json TEXT NOT NULL DEFAULT '[]',
    excluded_numbers_json TEXT NOT NULL DEFAULT '[]',
    business_info_json TEXT NOT NULL DEFAULT '{}'
);
"#;

/// SQLite-backed [`Store`]. All access goes through a single connection
/// behind a std mutex, dispatched to the blocking thread pool — the same
/// shape used for file-backed conversation state elsewhere in this stack.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<StdMutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES_SQL)?;
        Ok(Self {
            conn: Arc::new(StdMutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES_SQL)?;
        Ok(Self {
            conn: Arc::new(StdMutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, func: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let mut guard = conn.lock().expect("sqlite connection mutex poisoned");
            func(&mut guard)
        })
        .await?
    }
}

fn upsert_chat_row(conn: &Connection, jid: &str, patch: &ChatPatch) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO chats (jid, name, is_group, unread_count, last_message_timestamp, last_message_text)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(jid) DO UPDATE SET
           name = COALESCE(excluded.name, chats.name),
           is_group = COALESCE(excluded.is_group, chats.is_group),
           unread_count = COALESCE(excluded.unread_count, chats.unread_count),
           last_message_timestamp = COALESCE(excluded.last_message_timestamp, chats.last_message_timestamp),
           last_message_text = COALESCE(excluded.last_message_text, chats.last_message_text)",
        params![
            jid,
            patch.name,
            patch.is_group.map(|b| b as i64),
            patch.unread_count,
            patch.last_message_timestamp,
            patch.last_message_text,
        ],
    )?;
    Ok(())
}

fn row_to_chat(
    jid: String,
    name: Option<String>,
    is_group: Option<i64>,
    unread_count: Option<i64>,
    last_message_timestamp: Option<i64>,
    last_message_text: Option<String>,
) -> Chat {
    Chat {
        is_group: is_group.map(|v| v != 0).unwrap_or_else(|| is_group_jid(&jid)),
        unread_count: unread_count.unwrap_or(0),
        jid,
        name,
        last_message_timestamp,
        last_message_text,
    }
}

fn chat_to_patch(chat: &Chat) -> ChatPatch {
    ChatPatch {
        name: chat.name.clone(),
        is_group: Some(chat.is_group),
        unread_count: Some(chat.unread_count),
        last_message_timestamp: chat.last_message_timestamp,
        last_message_text: chat.last_message_text.clone(),
    }
}

fn summarize(content: &MessageContent) -> Option<String> {
    match content {
        MessageContent::Text { text, .. } => Some(text.clone()),
        MessageContent::Media { caption, .. } => {
            Some(caption.clone().unwrap_or_else(|| "[media]".to_string()))
        }
        MessageContent::Location { .. } => Some("[location]".to_string()),
        MessageContent::Contact { display_name, .. } => Some(format!("[contact: {display_name}]")),
        MessageContent::Unhandled { .. } => None,
    }
}

fn insert_message_row(conn: &Connection, record: &IngestRecord) -> Result<(), StoreError> {
    let payload = &record.payload;
    upsert_chat_row(
        conn,
        &payload.from,
        &ChatPatch {
            name: None,
            is_group: Some(is_group_jid(&payload.from)),
            unread_count: None,
            last_message_timestamp: Some(payload.timestamp),
            last_message_text: summarize(&payload.content),
        },
    )?;
    let payload_json = serde_json::to_string(payload)?;
    conn.execute(
        "INSERT INTO messages (id, jid, from_me, timestamp, payload_json)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO NOTHING",
        params![
            payload.id,
            payload.from,
            payload.from_me as i64,
            payload.timestamp,
            payload_json,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_chat(&self, jid: &str, patch: ChatPatch) -> Result<(), StoreError> {
        let jid = jid.to_string();
        self.with_conn(move |conn| upsert_chat_row(conn, &jid, &patch)).await
    }

    async fn upsert_chats(&self, chats: Vec<Chat>) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for chat in &chats {
                upsert_chat_row(&tx, &chat.jid, &chat_to_patch(chat))?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn save_message(&self, record: &IngestRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            insert_message_row(&tx, &record)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn save_messages_batch(&self, records: &[IngestRecord]) -> Result<(), StoreError> {
        let records = records.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for record in &records {
                insert_message_row(&tx, record)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_conversations(
        &self,
        limit: u32,
        cursor: Option<i64>,
    ) -> Result<Vec<Chat>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT jid, name, is_group, unread_count, last_message_timestamp, last_message_text
                 FROM chats
                 WHERE ?1 IS NULL OR (last_message_timestamp IS NOT NULL AND last_message_timestamp < ?1)
                 ORDER BY last_message_timestamp DESC NULLS LAST, jid ASC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![cursor, limit], |row| {
                    Ok(row_to_chat(
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn list_messages(
        &self,
        jid: &str,
        limit: u32,
        cursor: Option<i64>,
    ) -> Result<Vec<MessageInfo>, StoreError> {
        let jid = jid.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload_json FROM messages
                 WHERE jid = ?1 AND (?2 IS NULL OR timestamp < ?2)
                 ORDER BY timestamp DESC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![jid, cursor, limit], |row| {
                    let payload_json: String = row.get(0)?;
                    Ok(payload_json)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn get_oldest_message_anchor(
        &self,
        jid: &str,
    ) -> Result<Option<MessageAnchor>, StoreError> {
        let jid = jid.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, jid, from_me, timestamp FROM messages
                 WHERE jid = ?1 ORDER BY timestamp ASC LIMIT 1",
                params![jid],
                |row| {
                    Ok(MessageAnchor {
                        id: row.get(0)?,
                        jid: row.get(1)?,
                        from_me: row.get::<_, i64>(2)? != 0,
                        timestamp: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn ping(&self) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(true)
        })
        .await
    }

    async fn get_tenant_config(&self, username: &str) -> Result<Option<TenantConfig>, StoreError> {
        let username = username.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT webhooks_json, excluded_numbers_json, business_info_json
                     FROM tenant_configs WHERE username = ?1",
                    params![username],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;
            let Some((webhooks_json, excluded_json, business_json)) = row else {
                return Ok(None);
            };
            let webhooks: Vec<Webhook> = serde_json::from_str(&webhooks_json)?;
            let excluded_numbers: Vec<String> = serde_json::from_str(&excluded_json)?;
            let business_info: BusinessInfo = serde_json::from_str(&business_json)?;
            Ok(Some(TenantConfig {
                username,
                webhooks,
                excluded_numbers,
                business_info,
            }))
        })
        .await
    }

    async fn upsert_tenant_config(&self, config: &TenantConfig) -> Result<(), StoreError> {
        let config = config.clone();
        self.with_conn(move |conn| {
            let webhooks_json = serde_json::to_string(&config.webhooks)?;
            let excluded_json = serde_json::to_string(&config.excluded_numbers)?;
            let business_json = serde_json::to_string(&config.business_info)?;
            conn.execute(
                "INSERT INTO tenant_configs (username, webhooks_json, excluded_numbers_json, business_info_json)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(username) DO UPDATE SET
                   webhooks_json = excluded.webhooks_json,
                   excluded_numbers_json = excluded.excluded_numbers_json,
                   business_info_json = excluded.business_info_json",
                params![config.username, webhooks_json, excluded_json, business_json],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_business_info(&self, username: &str) -> Result<BusinessInfo, StoreError> {
        Ok(self
            .get_tenant_config(username)
            .await?
            .map(|config| config.business_info)
            .unwrap_or_default())
    }

    async fn save_business_info(
        &self,
        username: &str,
        info: &BusinessInfo,
    ) -> Result<(), StoreError> {
        let mut config = self
            .get_tenant_config(username)
            .await?
            .unwrap_or_else(|| TenantConfig::new(username));
        config.business_info = info.clone();
        self.upsert_tenant_config(&config).await
    }

    async fn get_excluded_numbers(&self, username: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .get_tenant_config(username)
            .await?
            .map(|config| config.excluded_numbers)
            .unwrap_or_default())
    }

    async fn set_excluded_numbers(
        &self,
        username: &str,
        numbers: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut config = self
            .get_tenant_config(username)
            .await?
            .unwrap_or_else(|| TenantConfig::new(username));
        config.excluded_numbers = numbers;
        self.upsert_tenant_config(&config).await
    }
}
