//! The tenant session manager (component H): one connection state machine
//! per tenant, wrapping an abstract upstream socket, normalizing its events
//! into the shared message model, and driving ingestion and webhook
//! notification.

mod manager;
mod session;
mod upstream;

pub use manager::TenantManager;
pub use session::{SessionState, TenantSession, MAX_RECONNECT_ATTEMPTS, QR_EXPIRY};
pub use upstream::{
    BusinessProfileSnapshot, ConnectionState, ContactUpdate, Notifier, UpstreamConnector,
    UpstreamError, UpstreamEvent, UpstreamMessage, UpstreamSocket,
};
