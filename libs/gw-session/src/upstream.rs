use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gw_store::MessageAnchor;
use gw_types::{Chat, MessageInfo};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("tenant session is not connected")]
    NotConnected,
    #[error("upstream error: {0}")]
    Other(String),
}

/// A chat-network participant or group update, as emitted by `contacts.*`
/// events.
#[derive(Debug, Clone)]
pub struct ContactUpdate {
    pub jid: String,
    pub name: Option<String>,
}

/// `connection.update`'s `connection` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Close { logged_out: bool },
}

/// One raw upstream message, prior to the `protocolMessage` filter that
/// every history/notify handler applies before normalizing into a
/// [`MessageInfo`].
#[derive(Debug, Clone)]
pub enum UpstreamMessage {
    /// Internal protocol chatter (e.g. a key-distribution message); never
    /// surfaced to the store or webhooks.
    Protocol,
    Chat(MessageInfo),
}

/// Best-effort business profile fetched from the upstream network. Fields
/// the upstream call doesn't return are `None` and left untouched by the
/// caller's merge.
#[derive(Debug, Clone, Default)]
pub struct BusinessProfileSnapshot {
    pub name: Option<String>,
    pub website_url: Option<String>,
}

/// Events emitted by a connected upstream socket. One tenant session
/// consumes exactly one event stream for the lifetime of its connection.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    ConnectionUpdate {
        qr: Option<String>,
        state: ConnectionState,
    },
    CredsUpdate,
    ChatsSet(Vec<Chat>),
    ChatsUpsert(Vec<Chat>),
    ContactsSet(Vec<ContactUpdate>),
    ContactsUpsert(Vec<ContactUpdate>),
    MessagingHistorySet {
        chats: Vec<Chat>,
        contacts: Vec<ContactUpdate>,
        messages: Vec<UpstreamMessage>,
    },
    MessagesUpsert {
        /// True for `kind == "notify"` (a live message); false for other
        /// upsert kinds, which are not individually webhook-notified.
        notify: bool,
        messages: Vec<UpstreamMessage>,
    },
}

/// Outbound operations a connected upstream socket supports.
#[async_trait]
pub trait UpstreamSocket: Send + Sync {
    /// Sends a text message and returns the upstream-assigned message id.
    /// The caller (the tenant session) synthesizes the outbound
    /// [`MessageInfo`] rather than the socket, so every `MessageInfo` in the
    /// system is built in exactly one place.
    async fn send_message(&self, to: &str, text: &str) -> Result<String, UpstreamError>;
    async fn check_number(&self, phone_digits: &str) -> Result<Option<String>, UpstreamError>;
    async fn logout(&self) -> Result<(), UpstreamError>;
    async fn self_jid(&self) -> Result<String, UpstreamError>;
    async fn business_profile(&self) -> Result<Option<BusinessProfileSnapshot>, UpstreamError>;
    async fn status(&self) -> Result<Option<String>, UpstreamError>;
    async fn fetch_message_history(
        &self,
        count: u32,
        anchor: Option<MessageAnchor>,
    ) -> Result<Vec<UpstreamMessage>, UpstreamError>;
}

/// Builds a connected [`UpstreamSocket`] plus its event stream for one
/// tenant. Stands in for the real chat-network client library, which this
/// gateway treats as an external collaborator specified only by this
/// interface.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(
        &self,
        username: &str,
        session_path: &Path,
        is_reconnect: bool,
    ) -> Result<(Arc<dyn UpstreamSocket>, mpsc::Receiver<UpstreamEvent>), UpstreamError>;

    /// Whether credential material already exists on disk for this session.
    fn has_credentials(&self, session_path: &Path) -> bool;

    /// Wipes credential material, called on logout or reconnect-ceiling.
    fn erase_credentials(&self, session_path: &Path) -> std::io::Result<()> {
        if session_path.exists() {
            std::fs::remove_dir_all(session_path)?;
        }
        Ok(())
    }
}

/// Inverts the `TenantSession` → webhook-dispatch dependency: a session
/// notifies through this trait rather than holding a concrete dispatcher
/// (which would otherwise need to hold the session registry back, forming
/// a cycle).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, username: &str, event: &str, data: serde_json::Value);
}
