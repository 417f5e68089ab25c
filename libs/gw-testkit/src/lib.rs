//! In-memory fakes shared by integration tests that need a working
//! end-to-end gateway without a real upstream network or a real database.
//!
//! Individual crates keep their own narrow, local fakes for unit tests; this
//! crate exists for the coarser-grained scenarios in `apps/gateway/tests`
//! that need the whole stack wired together.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use dashmap::DashMap;
use gw_session::{
    BusinessProfileSnapshot, ConnectionState, Notifier, UpstreamConnector, UpstreamError,
    UpstreamEvent, UpstreamMessage, UpstreamSocket,
};
use gw_store::{MessageAnchor, Store, StoreError};
use gw_types::{BusinessInfo, Chat, ChatPatch, IngestRecord, MessageInfo, TenantConfig};
use tokio::sync::mpsc;

/// An [`UpstreamSocket`] that never talks to a real network: sends are
/// recorded, number checks and history fetches return canned answers set up
/// by the test.
pub struct FakeSocket {
    pub sent: StdMutex<Vec<(String, String)>>,
    pub known_numbers: StdMutex<HashMap<String, String>>,
    pub self_jid: String,
    pub history: StdMutex<Vec<UpstreamMessage>>,
}

impl FakeSocket {
    pub fn new(self_jid: impl Into<String>) -> Self {
        Self {
            sent: StdMutex::new(Vec::new()),
            known_numbers: StdMutex::new(HashMap::new()),
            self_jid: self_jid.into(),
            history: StdMutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl UpstreamSocket for FakeSocket {
    async fn send_message(&self, to: &str, text: &str) -> Result<String, UpstreamError> {
        let mut sent = self.sent.lock().unwrap();
        let id = format!("FAKE-{}", sent.len() + 1);
        sent.push((to.to_string(), text.to_string()));
        Ok(id)
    }

    async fn check_number(&self, phone_digits: &str) -> Result<Option<String>, UpstreamError> {
        Ok(self.known_numbers.lock().unwrap().get(phone_digits).cloned())
    }

    async fn logout(&self) -> Result<(), UpstreamError> {
        Ok(())
    }

    async fn self_jid(&self) -> Result<String, UpstreamError> {
        Ok(self.self_jid.clone())
    }

    async fn business_profile(&self) -> Result<Option<BusinessProfileSnapshot>, UpstreamError> {
        Ok(None)
    }

    async fn status(&self) -> Result<Option<String>, UpstreamError> {
        Ok(None)
    }

    async fn fetch_message_history(
        &self,
        count: u32,
        _anchor: Option<MessageAnchor>,
    ) -> Result<Vec<UpstreamMessage>, UpstreamError> {
        let mut history = self.history.lock().unwrap();
        let take = count.min(history.len() as u32) as usize;
        Ok(history.drain(..take).collect())
    }
}

/// An [`UpstreamConnector`] that immediately reports `connection=open` on
/// every connect call and exposes the event sender so a test can push
/// further events (a QR, a disconnect, an inbound message) on demand.
pub struct FakeConnector {
    pub has_creds: AtomicBool,
    pub fail_next_connect: AtomicBool,
    event_tx: StdMutex<Option<mpsc::Sender<UpstreamEvent>>>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self {
            has_creds: AtomicBool::new(false),
            fail_next_connect: AtomicBool::new(false),
            event_tx: StdMutex::new(None),
        }
    }
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pushes an event to the most recently connected session, if any.
    pub fn push_event(&self, event: UpstreamEvent) {
        if let Some(tx) = self.event_tx.lock().unwrap().clone() {
            let _ = tx.try_send(event);
        }
    }
}

#[async_trait]
impl UpstreamConnector for FakeConnector {
    async fn connect(
        &self,
        _username: &str,
        _session_path: &Path,
        _is_reconnect: bool,
    ) -> Result<(Arc<dyn UpstreamSocket>, mpsc::Receiver<UpstreamEvent>), UpstreamError> {
        if self.fail_next_connect.swap(false, Ordering::SeqCst) {
            return Err(UpstreamError::Other("simulated connect failure".to_string()));
        }
        let (tx, rx) = mpsc::channel(64);
        let _ = tx.try_send(UpstreamEvent::ConnectionUpdate {
            qr: None,
            state: ConnectionState::Open,
        });
        *self.event_tx.lock().unwrap() = Some(tx);
        self.has_creds.store(true, Ordering::SeqCst);
        Ok((Arc::new(FakeSocket::new("15559999999@s.whatsapp.net")), rx))
    }

    fn has_credentials(&self, _session_path: &Path) -> bool {
        self.has_creds.load(Ordering::SeqCst)
    }
}

/// A [`Store`] backed by plain in-memory maps, good enough to exercise the
/// tenant session and webhook dispatcher without a real database.
#[derive(Default)]
pub struct InMemoryStore {
    chats: DashMap<String, Chat>,
    messages: DashMap<String, Vec<MessageInfo>>,
    tenant_configs: DashMap<String, TenantConfig>,
    business_info: DashMap<String, BusinessInfo>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_chat(&self, jid: &str, patch: ChatPatch) -> Result<(), StoreError> {
        let mut entry = self.chats.entry(jid.to_string()).or_insert_with(|| Chat::new(jid, false));
        if patch.name.is_some() {
            entry.name = patch.name;
        }
        if let Some(is_group) = patch.is_group {
            entry.is_group = is_group;
        }
        if let Some(unread) = patch.unread_count {
            entry.unread_count = unread;
        }
        if patch.last_message_timestamp.is_some() {
            entry.last_message_timestamp = patch.last_message_timestamp;
        }
        if patch.last_message_text.is_some() {
            entry.last_message_text = patch.last_message_text;
        }
        Ok(())
    }

    async fn upsert_chats(&self, chats: Vec<Chat>) -> Result<(), StoreError> {
        for chat in chats {
            self.chats.insert(chat.jid.clone(), chat);
        }
        Ok(())
    }

    async fn save_message(&self, record: &IngestRecord) -> Result<(), StoreError> {
        self.chats
            .entry(record.payload.from.clone())
            .or_insert_with(|| Chat::new(&record.payload.from, record.payload.is_group()));
        let mut bucket = self.messages.entry(record.payload.from.clone()).or_default();
        if !bucket.iter().any(|m| m.id == record.payload.id) {
            bucket.push(record.payload.clone());
        }
        Ok(())
    }

    async fn save_messages_batch(&self, records: &[IngestRecord]) -> Result<(), StoreError> {
        for record in records {
            self.save_message(record).await?;
        }
        Ok(())
    }

    async fn list_conversations(&self, limit: u32, _cursor: Option<i64>) -> Result<Vec<Chat>, StoreError> {
        Ok(self.chats.iter().take(limit as usize).map(|entry| entry.value().clone()).collect())
    }

    async fn list_messages(&self, jid: &str, limit: u32, _cursor: Option<i64>) -> Result<Vec<MessageInfo>, StoreError> {
        Ok(self
            .messages
            .get(jid)
            .map(|bucket| bucket.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_oldest_message_anchor(&self, jid: &str) -> Result<Option<MessageAnchor>, StoreError> {
        Ok(self.messages.get(jid).and_then(|bucket| {
            bucket.iter().min_by_key(|m| m.timestamp).map(|m| MessageAnchor {
                id: m.id.clone(),
                jid: jid.to_string(),
                from_me: m.from_me,
                timestamp: m.timestamp,
            })
        }))
    }

    async fn ping(&self) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn get_tenant_config(&self, username: &str) -> Result<Option<TenantConfig>, StoreError> {
        Ok(self.tenant_configs.get(username).map(|entry| entry.value().clone()))
    }

    async fn upsert_tenant_config(&self, config: &TenantConfig) -> Result<(), StoreError> {
        self.tenant_configs.insert(config.username.clone(), config.clone());
        Ok(())
    }

    async fn get_business_info(&self, username: &str) -> Result<BusinessInfo, StoreError> {
        Ok(self.business_info.get(username).map(|entry| entry.value().clone()).unwrap_or_default())
    }

    async fn save_business_info(&self, username: &str, info: &BusinessInfo) -> Result<(), StoreError> {
        self.business_info.insert(username.to_string(), info.clone());
        Ok(())
    }

    async fn get_excluded_numbers(&self, username: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .tenant_configs
            .get(username)
            .map(|entry| entry.excluded_numbers.clone())
            .unwrap_or_default())
    }

    async fn set_excluded_numbers(&self, username: &str, numbers: Vec<String>) -> Result<(), StoreError> {
        self.tenant_configs
            .entry(username.to_string())
            .or_insert_with(|| TenantConfig::new(username))
            .excluded_numbers = numbers;
        Ok(())
    }
}

/// A [`Notifier`] that records every call instead of delivering it anywhere,
/// for tests that only care whether and how notification happened.
#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: StdMutex<Vec<(String, String, serde_json::Value)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, username: &str, event: &str, data: serde_json::Value) {
        self.calls.lock().unwrap().push((username.to_string(), event.to_string(), data));
    }
}
