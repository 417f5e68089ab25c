use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gw_log::DurableLog;
use gw_queue::BoundedQueue;
use gw_store::Store;
use gw_telemetry::Metrics;
use gw_types::{derive_e164, normalize_to_jid, IngestRecord, MessageContent, MessageInfo, MessageType};
use serde_json::json;
use tokio::sync::{watch, Mutex};

use crate::upstream::{ConnectionState, Notifier, UpstreamConnector, UpstreamError, UpstreamMessage, UpstreamSocket};

/// Consecutive reconnect failures tolerated before the session is wiped and
/// re-initialized from scratch.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// How long a QR pairing code stays valid before the session gives up
/// waiting for it to be scanned.
pub const QR_EXPIRY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Connecting,
    WaitingQr { qr: String, expires_at: i64 },
    Connected,
    Reconnecting,
    LoggedOut { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckNumberResult {
    pub exists: bool,
    pub jid: Option<String>,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn now_seconds() -> i64 {
    now_millis() / 1000
}

/// One tenant's connection state machine. Owns the durable-log append path
/// for every message it normalizes, and drives webhook notification through
/// an injected [`Notifier`] rather than a concrete dispatcher.
pub struct TenantSession {
    username: String,
    session_path: PathBuf,
    connector: Arc<dyn UpstreamConnector>,
    store: Arc<dyn Store>,
    queue: Arc<BoundedQueue<IngestRecord>>,
    log: Arc<DurableLog>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
    state: Mutex<SessionState>,
    socket: Mutex<Option<Arc<dyn UpstreamSocket>>>,
    reconnect_attempts: AtomicU32,
    was_reconnecting: AtomicBool,
    qr_tx: watch::Sender<Option<String>>,
}

impl TenantSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        username: impl Into<String>,
        session_path: PathBuf,
        connector: Arc<dyn UpstreamConnector>,
        store: Arc<dyn Store>,
        queue: Arc<BoundedQueue<IngestRecord>>,
        log: Arc<DurableLog>,
        notifier: Arc<dyn Notifier>,
        metrics: Metrics,
    ) -> Arc<Self> {
        let (qr_tx, _qr_rx) = watch::channel(None);
        Arc::new(Self {
            username: username.into(),
            session_path,
            connector,
            store,
            queue,
            log,
            notifier,
            metrics,
            state: Mutex::new(SessionState::Idle),
            socket: Mutex::new(None),
            reconnect_attempts: AtomicU32::new(0),
            was_reconnecting: AtomicBool::new(false),
            qr_tx,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    async fn set_state(&self, state: SessionState) {
        tracing::debug!(username = %self.username, ?state, "session state transition");
        *self.state.lock().await = state;
    }

    async fn current_socket(&self) -> Option<Arc<dyn UpstreamSocket>> {
        self.socket.lock().await.clone()
    }

    async fn require_connected(&self) -> Result<Arc<dyn UpstreamSocket>, UpstreamError> {
        if !matches!(*self.state.lock().await, SessionState::Connected) {
            return Err(UpstreamError::NotConnected);
        }
        self.current_socket().await.ok_or(UpstreamError::NotConnected)
    }

    /// Waits until a QR code has been cached (by a `connection.update` event
    /// carrying one), or `timeout` elapses.
    pub async fn wait_for_qr(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.qr_tx.subscribe();
        if let Some(qr) = rx.borrow().clone() {
            return Some(qr);
        }
        match tokio::time::timeout(timeout, rx.changed()).await {
            Ok(Ok(())) => rx.borrow().clone(),
            _ => None,
        }
    }

    /// Connects (or reconnects) to the upstream network and spawns the
    /// background task that drains its event stream. Recursive because a
    /// reconnect-ceiling breach wipes the session and calls back into a
    /// fresh, non-reconnect `initialize` — boxed so the recursion compiles.
    pub fn initialize<'a>(
        self: &'a Arc<Self>,
        is_reconnect: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), UpstreamError>> + Send + 'a>> {
        Box::pin(async move {
            if is_reconnect {
                if !self.connector.has_credentials(&self.session_path) {
                    return Err(UpstreamError::Other(
                        "cannot reconnect: no credentials on disk".to_string(),
                    ));
                }
                let attempts = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempts > MAX_RECONNECT_ATTEMPTS {
                    self.set_state(SessionState::LoggedOut {
                        reason: "reconnect_ceiling".to_string(),
                    })
                    .await;
                    let _ = self.connector.erase_credentials(&self.session_path);
                    self.reconnect_attempts.store(0, Ordering::SeqCst);
                    self.set_state(SessionState::Idle).await;
                    return self.initialize(false).await;
                }
            }

            self.set_state(SessionState::Connecting).await;
            let (socket, mut events) = match self
                .connector
                .connect(&self.username, &self.session_path, is_reconnect)
                .await
            {
                Ok(pair) => pair,
                Err(err) => {
                    self.notifier
                        .notify(&self.username, "error", json!({ "stage": "connect", "error": err.to_string() }))
                        .await;
                    return Err(err);
                }
            };
            *self.socket.lock().await = Some(socket);
            if is_reconnect {
                self.was_reconnecting.store(true, Ordering::SeqCst);
            }

            let this = Arc::clone(self);
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    this.handle_event(event).await;
                }
            });
            Ok(())
        })
    }

    async fn handle_event(&self, event: crate::upstream::UpstreamEvent) {
        use crate::upstream::UpstreamEvent::*;
        match event {
            ConnectionUpdate { qr, state } => {
                if let Some(qr) = qr {
                    let expires_at = now_millis() + QR_EXPIRY.as_millis() as i64;
                    self.set_state(SessionState::WaitingQr {
                        qr: qr.clone(),
                        expires_at,
                    })
                    .await;
                    let _ = self.qr_tx.send(Some(qr));
                }
                match state {
                    ConnectionState::Open => self.on_connected().await,
                    ConnectionState::Close { logged_out } => self.on_disconnected(logged_out).await,
                }
            }
            CredsUpdate => {}
            ChatsSet(chats) | ChatsUpsert(chats) => {
                if let Err(err) = self.store.upsert_chats(chats).await {
                    tracing::warn!(error = %err, "failed to persist chat batch");
                    self.notifier
                        .notify(&self.username, "error", json!({ "stage": "chats.upsert", "error": err.to_string() }))
                        .await;
                }
            }
            ContactsSet(contacts) | ContactsUpsert(contacts) => {
                for contact in contacts {
                    let patch = gw_types::ChatPatch {
                        name: contact.name,
                        ..Default::default()
                    };
                    if let Err(err) = self.store.upsert_chat(&contact.jid, patch).await {
                        tracing::warn!(error = %err, "failed to persist contact update");
                        self.notifier
                            .notify(&self.username, "error", json!({ "stage": "contacts.upsert", "error": err.to_string() }))
                            .await;
                    }
                }
            }
            MessagingHistorySet {
                chats,
                contacts,
                messages,
            } => {
                if let Err(err) = self.store.upsert_chats(chats).await {
                    tracing::warn!(error = %err, "failed to persist history chats");
                    self.notifier
                        .notify(&self.username, "error", json!({ "stage": "messaging-history.chats", "error": err.to_string() }))
                        .await;
                }
                for contact in contacts {
                    let patch = gw_types::ChatPatch {
                        name: contact.name,
                        ..Default::default()
                    };
                    if let Err(err) = self.store.upsert_chat(&contact.jid, patch).await {
                        tracing::warn!(error = %err, "failed to persist history contact");
                        self.notifier
                            .notify(&self.username, "error", json!({ "stage": "messaging-history.contacts", "error": err.to_string() }))
                            .await;
                    }
                }
                for message in messages {
                    if let UpstreamMessage::Chat(info) = message {
                        let _ = self.enqueue_message(info).await;
                    }
                }
            }
            MessagesUpsert { notify, messages } => {
                for message in messages {
                    let UpstreamMessage::Chat(info) = message else {
                        continue;
                    };
                    let _ = self.enqueue_message(info.clone()).await;
                    if notify {
                        let business = self
                            .store
                            .get_business_info(&self.username)
                            .await
                            .unwrap_or_default();
                        self.notifier
                            .notify(
                                &self.username,
                                "message.received",
                                json!({ "message": info, "business": business }),
                            )
                            .await;
                    }
                }
            }
        }
    }

    async fn on_connected(&self) {
        self.set_state(SessionState::Connected).await;
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        let was_reconnecting = self.was_reconnecting.swap(false, Ordering::SeqCst);

        self.notifier
            .notify(&self.username, "connection", json!({ "status": "connected" }))
            .await;

        if let Err(err) = self.refresh_business_info().await {
            tracing::warn!(error = %err, "failed to refresh business info after connect");
        }

        if was_reconnecting {
            if let Err(err) = self.sync_history_on_reconnect().await {
                tracing::warn!(error = %err, "history backfill after reconnect failed");
            }
        }
    }

    async fn on_disconnected(&self, logged_out: bool) {
        if logged_out {
            self.set_state(SessionState::LoggedOut {
                reason: "remote_logout".to_string(),
            })
            .await;
            let _ = self.connector.erase_credentials(&self.session_path);
            self.set_state(SessionState::Idle).await;
            if let Err(err) = self.initialize(false).await {
                tracing::error!(error = %err, "failed to reinitialize after remote logout");
                self.notifier
                    .notify(&self.username, "error", json!({ "stage": "reinitialize", "error": err.to_string() }))
                    .await;
            }
        } else {
            self.set_state(SessionState::Reconnecting).await;
            if let Err(err) = self.initialize(true).await {
                tracing::error!(error = %err, "reconnect attempt failed");
                self.notifier
                    .notify(&self.username, "error", json!({ "stage": "reconnect", "error": err.to_string() }))
                    .await;
            }
        }
    }

    /// Appends `info` to the durable log (the at-least-once anchor) and
    /// best-effort hands it to the bounded queue. A log-append failure is
    /// logged and counted; the message is simply not delivered downstream
    /// this time (no producer waits on this path for a retry).
    async fn enqueue_message(&self, info: MessageInfo) -> Result<(), ()> {
        let record = IngestRecord::new(info, now_millis());
        self.metrics.record_received();
        match self.log.append(&record).await {
            Ok(_) => {
                let _ = self.queue.try_enqueue(record);
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to append ingestion record to durable log");
                self.metrics.record_log_append_failed();
                Err(())
            }
        }
    }

    pub async fn send_message(&self, to: &str, text: &str) -> Result<MessageInfo, UpstreamError> {
        let socket = self.require_connected().await?;
        let jid = normalize_to_jid(to);
        let id = socket.send_message(&jid, text).await?;
        let info = MessageInfo {
            id,
            from: jid,
            from_me: true,
            timestamp: now_seconds(),
            message_type: MessageType::Text,
            push_name: None,
            content: MessageContent::Text {
                text: text.to_string(),
                context_info: None,
            },
        };
        let _ = self.enqueue_message(info.clone()).await;
        Ok(info)
    }

    pub async fn check_number(&self, phone: &str) -> Result<CheckNumberResult, UpstreamError> {
        let socket = self.require_connected().await?;
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        let jid = socket.check_number(&digits).await?;
        Ok(CheckNumberResult {
            exists: jid.is_some(),
            jid,
        })
    }

    pub async fn logout(&self) -> Result<(), UpstreamError> {
        if let Some(socket) = self.current_socket().await {
            let _ = socket.logout().await;
        }
        self.set_state(SessionState::LoggedOut {
            reason: "user_logout".to_string(),
        })
        .await;
        let _ = self.connector.erase_credentials(&self.session_path);
        *self.socket.lock().await = None;
        Ok(())
    }

    /// Pulls the self JID and optional business profile from upstream and
    /// merges them best-effort into the stored `BusinessInfo`, preserving
    /// any field upstream didn't return.
    pub async fn refresh_business_info(&self) -> Result<(), UpstreamError> {
        let socket = self.current_socket().await.ok_or(UpstreamError::NotConnected)?;
        let self_jid = socket.self_jid().await.ok();
        let profile = socket.business_profile().await.unwrap_or(None);

        let mut info = self
            .store
            .get_business_info(&self.username)
            .await
            .map_err(|err| UpstreamError::Other(err.to_string()))?;

        if let Some(profile) = profile {
            if profile.name.is_some() {
                info.name = profile.name;
            }
            if profile.website_url.is_some() {
                info.website_url = profile.website_url;
            }
        }

        if let Some(jid) = self_jid {
            let digits = derive_e164(&jid).trim_start_matches('+').to_string();
            if !digits.is_empty() && !info.mobile_numbers.contains(&digits) {
                info.mobile_numbers.push(digits);
            }
        }

        info.last_updated = Some(now_millis());
        self.store
            .save_business_info(&self.username, &info)
            .await
            .map_err(|err| UpstreamError::Other(err.to_string()))?;
        Ok(())
    }

    /// Walks every stored conversation (a page of up to 1000) and backfills
    /// each one's older history from upstream.
    pub async fn sync_history_on_reconnect(&self) -> Result<(), UpstreamError> {
        let conversations = self
            .store
            .list_conversations(1000, None)
            .await
            .map_err(|err| UpstreamError::Other(err.to_string()))?;
        for chat in conversations {
            if let Err(err) = self.sync_history_for_chat(&chat.jid, 6, 50).await {
                tracing::warn!(jid = %chat.jid, error = %err, "history backfill for chat failed");
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(())
    }

    /// Repeatedly fetches older history for one chat using the oldest
    /// stored message as the pagination anchor, stopping once the anchor
    /// fails to advance or `max_pages` is reached.
    pub async fn sync_history_for_chat(
        &self,
        jid: &str,
        max_pages: u32,
        batch: u32,
    ) -> Result<(), UpstreamError> {
        let socket = self.current_socket().await.ok_or(UpstreamError::NotConnected)?;
        let mut pages = 0;
        loop {
            if pages >= max_pages {
                break;
            }
            let anchor = self
                .store
                .get_oldest_message_anchor(jid)
                .await
                .map_err(|err| UpstreamError::Other(err.to_string()))?;
            let messages = socket.fetch_message_history(batch, anchor.clone()).await?;
            if messages.is_empty() {
                break;
            }
            for message in &messages {
                if let UpstreamMessage::Chat(info) = message {
                    let _ = self.enqueue_message(info.clone()).await;
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
            let new_anchor = self
                .store
                .get_oldest_message_anchor(jid)
                .await
                .unwrap_or(None);
            if new_anchor == anchor {
                break;
            }
            pages += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{BusinessProfileSnapshot, ConnectionState, UpstreamEvent};
    use async_trait::async_trait;
    use gw_store::StoreError;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool as StdAtomicBool;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    struct FakeSocket {
        sent: StdMutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl UpstreamSocket for FakeSocket {
        async fn send_message(&self, to: &str, text: &str) -> Result<String, UpstreamError> {
            self.sent.lock().unwrap().push((to.to_string(), text.to_string()));
            Ok("UPSTREAM-1".to_string())
        }
        async fn check_number(&self, phone_digits: &str) -> Result<Option<String>, UpstreamError> {
            if phone_digits == "15551234567" {
                Ok(Some(format!("{phone_digits}@s.whatsapp.net")))
            } else {
                Ok(None)
            }
        }
        async fn logout(&self) -> Result<(), UpstreamError> {
            Ok(())
        }
        async fn self_jid(&self) -> Result<String, UpstreamError> {
            Ok("15559999999@s.whatsapp.net".to_string())
        }
        async fn business_profile(&self) -> Result<Option<BusinessProfileSnapshot>, UpstreamError> {
            Ok(Some(BusinessProfileSnapshot {
                name: Some("Acme".to_string()),
                website_url: None,
            }))
        }
        async fn status(&self) -> Result<Option<String>, UpstreamError> {
            Ok(None)
        }
        async fn fetch_message_history(
            &self,
            _count: u32,
            _anchor: Option<gw_store::MessageAnchor>,
        ) -> Result<Vec<UpstreamMessage>, UpstreamError> {
            Ok(vec![])
        }
    }

    struct FakeConnector {
        fail_connect: StdAtomicBool,
        event_tx: StdMutex<Option<mpsc::Sender<UpstreamEvent>>>,
    }

    impl FakeConnector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail_connect: StdAtomicBool::new(false),
                event_tx: StdMutex::new(None),
            })
        }

        fn push_event(&self, event: UpstreamEvent) {
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
            _session_path: &std::path::Path,
            _is_reconnect: bool,
        ) -> Result<(Arc<dyn UpstreamSocket>, mpsc::Receiver<UpstreamEvent>), UpstreamError> {
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(UpstreamError::Other("connect failed".to_string()));
            }
            let (tx, rx) = mpsc::channel(32);
            let _ = tx.try_send(UpstreamEvent::ConnectionUpdate {
                qr: None,
                state: ConnectionState::Open,
            });
            *self.event_tx.lock().unwrap() = Some(tx);
            Ok((
                Arc::new(FakeSocket {
                    sent: StdMutex::new(Vec::new()),
                }),
                rx,
            ))
        }
        fn has_credentials(&self, _session_path: &std::path::Path) -> bool {
            true
        }
    }

    struct NullNotifier {
        calls: StdMutex<Vec<(String, String)>>,
    }

    impl NullNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn notify(&self, username: &str, event: &str, _data: serde_json::Value) {
            self.calls.lock().unwrap().push((username.to_string(), event.to_string()));
        }
    }

    struct InMemoryStore {
        business: StdMutex<HashMap<String, gw_types::BusinessInfo>>,
    }

    impl InMemoryStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                business: StdMutex::new(HashMap::new()),
            })
        }
    }

    #[async_trait]
    impl Store for InMemoryStore {
        async fn upsert_chat(&self, _jid: &str, _patch: gw_types::ChatPatch) -> Result<(), StoreError> {
            Ok(())
        }
        async fn upsert_chats(&self, _chats: Vec<gw_types::Chat>) -> Result<(), StoreError> {
            Ok(())
        }
        async fn save_message(&self, _record: &IngestRecord) -> Result<(), StoreError> {
            Ok(())
        }
        async fn save_messages_batch(&self, _records: &[IngestRecord]) -> Result<(), StoreError> {
            Ok(())
        }
        async fn list_conversations(
            &self,
            _limit: u32,
            _cursor: Option<i64>,
        ) -> Result<Vec<gw_types::Chat>, StoreError> {
            Ok(vec![])
        }
        async fn list_messages(
            &self,
            _jid: &str,
            _limit: u32,
            _cursor: Option<i64>,
        ) -> Result<Vec<MessageInfo>, StoreError> {
            Ok(vec![])
        }
        async fn get_oldest_message_anchor(
            &self,
            _jid: &str,
        ) -> Result<Option<gw_store::MessageAnchor>, StoreError> {
            Ok(None)
        }
        async fn ping(&self) -> Result<bool, StoreError> {
            Ok(true)
        }
        async fn get_tenant_config(&self, _username: &str) -> Result<Option<gw_types::TenantConfig>, StoreError> {
            Ok(None)
        }
        async fn upsert_tenant_config(&self, _config: &gw_types::TenantConfig) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get_business_info(&self, username: &str) -> Result<gw_types::BusinessInfo, StoreError> {
            Ok(self.business.lock().unwrap().get(username).cloned().unwrap_or_default())
        }
        async fn save_business_info(&self, username: &str, info: &gw_types::BusinessInfo) -> Result<(), StoreError> {
            self.business.lock().unwrap().insert(username.to_string(), info.clone());
            Ok(())
        }
        async fn get_excluded_numbers(&self, _username: &str) -> Result<Vec<String>, StoreError> {
            Ok(vec![])
        }
        async fn set_excluded_numbers(&self, _username: &str, _numbers: Vec<String>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    async fn session_with(
        connector: Arc<FakeConnector>,
    ) -> (
        Arc<TenantSession>,
        Arc<InMemoryStore>,
        Arc<NullNotifier>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(DurableLog::open(dir.path().join("log")).await.unwrap());
        let store = InMemoryStore::new();
        let notifier = NullNotifier::new();
        let queue = Arc::new(BoundedQueue::new(64));
        let session = TenantSession::new(
            "alice",
            PathBuf::from("/tmp/does-not-matter"),
            connector,
            Arc::clone(&store) as Arc<dyn Store>,
            queue,
            log,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Metrics::new(),
        );
        (session, store, notifier, dir)
    }

    #[tokio::test]
    async fn initialize_connects_and_reaches_connected_state() {
        let connector = FakeConnector::new();
        let (session, _store, notifier, _dir) = session_with(connector).await;
        session.initialize(false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.state().await, SessionState::Connected);
        assert!(notifier.calls.lock().unwrap().iter().any(|(_, e)| e == "connection"));
    }

    #[tokio::test]
    async fn send_message_requires_connected_state() {
        let connector = FakeConnector::new();
        let (session, _store, _notifier, _dir) = session_with(connector).await;
        let err = session.send_message("+15551234567", "hi").await.unwrap_err();
        assert!(matches!(err, UpstreamError::NotConnected));
    }

    #[tokio::test]
    async fn send_message_synthesizes_from_me_record_once_connected() {
        let connector = FakeConnector::new();
        let (session, _store, _notifier, _dir) = session_with(connector).await;
        session.initialize(false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let info = session.send_message("+15551234567", "hello").await.unwrap();
        assert!(info.from_me);
        assert_eq!(info.id, "UPSTREAM-1");
        assert_eq!(info.from, "15551234567@s.whatsapp.net");
    }

    #[tokio::test]
    async fn refresh_business_info_merges_self_number_and_name() {
        let connector = FakeConnector::new();
        let (session, store, _notifier, _dir) = session_with(connector).await;
        session.initialize(false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let info = store.get_business_info("alice").await.unwrap();
        assert_eq!(info.name.as_deref(), Some("Acme"));
        assert!(info.mobile_numbers.contains(&"15559999999".to_string()));
    }

    #[tokio::test]
    async fn qr_code_is_cached_and_waitable() {
        let connector = FakeConnector::new();
        let (session, _store, _notifier, _dir) = session_with(Arc::clone(&connector)).await;

        let wait_handle = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.wait_for_qr(Duration::from_secs(2)).await })
        };

        session.initialize(false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        connector.push_event(UpstreamEvent::ConnectionUpdate {
            qr: Some("qr-code-data".to_string()),
            state: ConnectionState::Close { logged_out: false },
        });

        let qr = wait_handle.await.unwrap();
        assert_eq!(qr.as_deref(), Some("qr-code-data"));
    }

    #[tokio::test]
    async fn remote_logout_erases_session_and_returns_to_idle() {
        let connector = FakeConnector::new();
        let (session, _store, _notifier, _dir) = session_with(Arc::clone(&connector)).await;
        session.initialize(false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        connector.push_event(UpstreamEvent::ConnectionUpdate {
            qr: None,
            state: ConnectionState::Close { logged_out: true },
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The fake connector reconnects immediately on re-initialize, so the
        // session ends up back in `Connected` rather than stuck `Idle`.
        assert_eq!(session.state().await, SessionState::Connected);
    }
}
