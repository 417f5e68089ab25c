use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use gw_log::DurableLog;
use gw_queue::BoundedQueue;
use gw_store::Store;
use gw_telemetry::Metrics;
use gw_types::IngestRecord;
use thiserror::Error;

use crate::session::TenantSession;
use crate::upstream::{Notifier, UpstreamConnector};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("tenant '{0}' is not registered")]
    UnknownTenant(String),
    #[error("upstream error: {0}")]
    Upstream(#[from] crate::upstream::UpstreamError),
}

/// Registry of every tenant's [`TenantSession`], keyed by username. One
/// process hosts every tenant configured for it; there is no per-tenant
/// process isolation.
pub struct TenantManager {
    sessions: DashMap<String, Arc<TenantSession>>,
    sessions_root: PathBuf,
    connector: Arc<dyn UpstreamConnector>,
    store: Arc<dyn Store>,
    queue: Arc<BoundedQueue<IngestRecord>>,
    log: Arc<DurableLog>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
}

impl TenantManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions_root: PathBuf,
        connector: Arc<dyn UpstreamConnector>,
        store: Arc<dyn Store>,
        queue: Arc<BoundedQueue<IngestRecord>>,
        log: Arc<DurableLog>,
        notifier: Arc<dyn Notifier>,
        metrics: Metrics,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            sessions_root,
            connector,
            store,
            queue,
            log,
            notifier,
            metrics,
        }
    }

    fn session_path(&self, username: &str) -> PathBuf {
        self.sessions_root.join(username)
    }

    pub fn sessions_root(&self) -> &std::path::Path {
        &self.sessions_root
    }

    /// Returns the tenant's session, creating (but not connecting) it on
    /// first access.
    pub fn get_or_create(&self, username: &str) -> Arc<TenantSession> {
        if let Some(existing) = self.sessions.get(username) {
            return Arc::clone(existing.value());
        }
        let session = TenantSession::new(
            username.to_string(),
            self.session_path(username),
            Arc::clone(&self.connector),
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            Arc::clone(&self.log),
            Arc::clone(&self.notifier),
            self.metrics.clone(),
        );
        self.sessions.insert(username.to_string(), Arc::clone(&session));
        session
    }

    pub fn get(&self, username: &str) -> Option<Arc<TenantSession>> {
        self.sessions.get(username).map(|entry| Arc::clone(entry.value()))
    }

    pub fn usernames(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Creates (if needed) and connects a tenant's session.
    pub async fn connect(&self, username: &str) -> Result<Arc<TenantSession>, ManagerError> {
        let session = self.get_or_create(username);
        session.initialize(false).await?;
        Ok(session)
    }

    /// Reconnects every tenant under `sessions_root` that already has
    /// upstream credentials on disk. Tenants with no credentials are left
    /// idle until a pairing request creates them explicitly.
    pub async fn reconnect_all(&self, usernames: &[String]) -> Vec<(String, Result<(), ManagerError>)> {
        let mut results = Vec::with_capacity(usernames.len());
        for username in usernames {
            let session = self.get_or_create(username);
            let path = self.session_path(username);
            if !self.connector.has_credentials(&path) {
                results.push((username.clone(), Ok(())));
                continue;
            }
            let outcome = session.initialize(true).await.map_err(ManagerError::from);
            results.push((username.clone(), outcome));
        }
        results
    }

    pub async fn logout(&self, username: &str) -> Result<(), ManagerError> {
        let session = self
            .get(username)
            .ok_or_else(|| ManagerError::UnknownTenant(username.to_string()))?;
        session.logout().await?;
        Ok(())
    }
}
