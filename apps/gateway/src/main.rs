//! Gateway composition root: owns process startup, wires every component
//! together, and exposes the minimal `/health`, `/ready`, `/metrics` HTTP
//! surface. No business logic lives here — only wiring and shutdown.

mod upstream_stub;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use gw_config::Config;
use gw_dlq::DeadLetterLog;
use gw_log::{Checkpointer, DurableLog};
use gw_pipeline::{run_replay_loop, run_worker};
use gw_queue::BoundedQueue;
use gw_session::{Notifier, TenantManager, UpstreamConnector};
use gw_store::{SqliteStore, Store};
use gw_telemetry::{init_tracing, Metrics, TelemetryConfig};
use gw_types::IngestRecord;
use gw_webhook::WebhookDispatcher;
use tokio::sync::watch;
use upstream_stub::NullUpstreamConnector;

#[derive(Clone)]
struct AppState {
    metrics: Metrics,
    store: Arc<dyn Store>,
    ready_max_queue_depth: usize,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let ok = state.store.ping().await.unwrap_or(false);
    let snapshot = state.metrics.snapshot();
    let body = Json(serde_json::json!({
        "ok": ok,
        "queueDepth": snapshot.queue_depth,
        "counters": snapshot,
    }));
    let status = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, body)
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = state.store.ping().await.unwrap_or(false);
    let depth_ok = (state.metrics.queue_depth() as usize) <= state.ready_max_queue_depth;
    if store_ok && depth_ok {
        StatusCode::OK.into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_tracing(&telemetry)?;

    let config = Config::from_env().context("failed to load configuration")?;
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .context("failed to create data directory")?;

    let log = Arc::new(
        DurableLog::open(&config.log_path)
            .await
            .context("failed to open durable log")?,
    );
    let checkpointer = Checkpointer::new(&config.checkpoint_path);
    let dlq = Arc::new(
        DeadLetterLog::open(&config.dlq_path)
            .await
            .context("failed to open dead-letter log")?,
    );
    let queue: Arc<BoundedQueue<IngestRecord>> = Arc::new(BoundedQueue::new(config.queue_capacity));
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.store_path).context("failed to open store")?);
    let metrics = Metrics::new();

    let webhook_dispatcher = Arc::new(WebhookDispatcher::new(Arc::clone(&store))?);
    let notifier: Arc<dyn Notifier> = webhook_dispatcher;

    let connector: Arc<dyn UpstreamConnector> = Arc::new(NullUpstreamConnector);
    let sessions_root = config.data_dir.join("sessions");
    let manager = Arc::new(TenantManager::new(
        sessions_root,
        connector,
        Arc::clone(&store),
        Arc::clone(&queue),
        Arc::clone(&log),
        notifier,
        metrics.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let replay_handle = tokio::spawn(run_replay_loop(
        config.log_path.clone(),
        checkpointer,
        Arc::clone(&queue),
        metrics.clone(),
        shutdown_rx.clone(),
    ));

    let mut worker_handles = Vec::with_capacity(config.workers);
    for worker_id in 0..config.workers {
        worker_handles.push(tokio::spawn(run_worker(
            worker_id,
            Arc::clone(&queue),
            Arc::clone(&store),
            Arc::clone(&dlq),
            metrics.clone(),
            config.retry.clone(),
            config.batch_size,
            config.batch_max_wait,
        )));
    }

    let known_tenants = discover_tenants(manager.sessions_root()).await;
    let _ = manager.reconnect_all(&known_tenants).await;

    let metrics_reader_queue = Arc::clone(&queue);
    let metrics_reader_metrics = metrics.clone();
    let mut metrics_reader_shutdown = shutdown_rx.clone();
    let metrics_reader_handle = tokio::spawn(async move {
        loop {
            metrics_reader_metrics.set_queue_depth(metrics_reader_queue.depth() as i64);
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {}
                _ = metrics_reader_shutdown.changed() => break,
            }
        }
    });

    let state = AppState {
        metrics: metrics.clone(),
        store: Arc::clone(&store),
        ready_max_queue_depth: config.ready_max_queue_depth,
    };
    let app = router(state);

    let addr: SocketAddr = config.bind_addr.parse().context("invalid GATEWAY_BIND address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind http listener")?;
    tracing::info!(%addr, "gateway listening");

    let serve_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        let mut rx = serve_shutdown;
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = rx.changed().await;
        });
        if let Err(err) = server.await {
            tracing::error!(error = %err, "http server exited with error");
        }
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = server_handle.await;
    queue.close().await;
    let _ = replay_handle.await;
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = metrics_reader_handle.await;
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    Ok(())
}

/// Discovers tenants with existing on-disk credentials by listing
/// subdirectories of the sessions root, each named after its tenant.
async fn discover_tenants(sessions_root: &std::path::Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(sessions_root).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gw_store::{MessageAnchor, StoreError};
    use gw_types::{BusinessInfo, Chat, ChatPatch, IngestRecord, MessageInfo, TenantConfig};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A [`Store`] whose `ping` can be toggled to fail, so `/health` and
    /// `/ready` can be tested against both outcomes without a real database.
    struct PingableStore {
        ok: AtomicBool,
    }

    impl PingableStore {
        fn new(ok: bool) -> Arc<Self> {
            Arc::new(Self { ok: AtomicBool::new(ok) })
        }
    }

    #[async_trait]
    impl Store for PingableStore {
        async fn upsert_chat(&self, _jid: &str, _patch: ChatPatch) -> Result<(), StoreError> {
            Ok(())
        }
        async fn upsert_chats(&self, _chats: Vec<Chat>) -> Result<(), StoreError> {
            Ok(())
        }
        async fn save_message(&self, _record: &IngestRecord) -> Result<(), StoreError> {
            Ok(())
        }
        async fn save_messages_batch(&self, _records: &[IngestRecord]) -> Result<(), StoreError> {
            Ok(())
        }
        async fn list_conversations(&self, _limit: u32, _cursor: Option<i64>) -> Result<Vec<Chat>, StoreError> {
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
        async fn get_oldest_message_anchor(&self, _jid: &str) -> Result<Option<MessageAnchor>, StoreError> {
            Ok(None)
        }
        async fn ping(&self) -> Result<bool, StoreError> {
            Ok(self.ok.load(Ordering::SeqCst))
        }
        async fn get_tenant_config(&self, _username: &str) -> Result<Option<TenantConfig>, StoreError> {
            Ok(None)
        }
        async fn upsert_tenant_config(&self, _config: &TenantConfig) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get_business_info(&self, _username: &str) -> Result<BusinessInfo, StoreError> {
            Ok(BusinessInfo::default())
        }
        async fn save_business_info(&self, _username: &str, _info: &BusinessInfo) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get_excluded_numbers(&self, _username: &str) -> Result<Vec<String>, StoreError> {
            Ok(vec![])
        }
        async fn set_excluded_numbers(&self, _username: &str, _numbers: Vec<String>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn state_with(store: Arc<dyn Store>) -> AppState {
        AppState {
            metrics: Metrics::new(),
            store,
            ready_max_queue_depth: 100,
        }
    }

    #[tokio::test]
    async fn health_is_ok_with_body_when_store_pings() {
        let state = state_with(PingableStore::new(true));
        let response = health(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ok"], true);
        assert!(json["queueDepth"].is_i64());
        assert!(json["counters"].is_object());
    }

    #[tokio::test]
    async fn health_is_unavailable_when_store_ping_fails() {
        let state = state_with(PingableStore::new(false));
        let response = health(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ok"], false);
    }
}
