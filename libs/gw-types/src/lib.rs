//! Shared data model for the WhatsApp ingestion gateway.
//!
//! This crate owns every type that crosses a component boundary: the
//! normalized message model produced by a tenant session, the envelope
//! written to the durable log, the persisted `Chat`/`Message` rows, and
//! per-tenant configuration. Nothing here talks to a filesystem, a socket,
//! or a database — those concerns live in the crates that depend on this
//! one.

mod chat;
mod ingest;
mod jid;
mod message;
mod tenant;

pub use chat::{Chat, ChatPatch};
pub use ingest::IngestRecord;
pub use jid::{derive_e164, is_group_jid, normalize_to_jid};
pub use message::{MessageContent, MessageInfo, MessageType};
pub use tenant::{BusinessInfo, TenantConfig, Webhook};
