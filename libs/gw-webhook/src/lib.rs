//! The webhook dispatcher (component I): per-tenant, multi-destination,
//! HMAC-signed HTTP delivery with exclusion filtering.
//!
//! Implements [`gw_session::Notifier`] so a [`gw_session::TenantSession`]
//! can fire events without holding a concrete dependency on this crate —
//! the dependency only runs this direction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gw_session::Notifier;
use gw_store::Store;
use gw_types::{derive_e164, TenantConfig, Webhook};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const USER_AGENT: &str = "Baileys-API-Webhook";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("store error: {0}")]
    Store(#[from] gw_store::StoreError),
    #[error("http client build failed: {0}")]
    ClientBuild(reqwest::Error),
}

#[derive(Debug, Serialize)]
struct WebhookRef<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'a str,
    username: &'a str,
    timestamp: String,
    data: serde_json::Value,
    webhook: WebhookRef<'a>,
}

/// Signed, multi-destination, per-tenant webhook delivery.
///
/// Delivery is best-effort: non-2xx responses and transport errors are
/// logged and counted, never retried at this layer (the durable log is the
/// source of truth for the underlying message; see [`gw_session`]'s
/// ingestion path for the retry layer that actually matters).
pub struct WebhookDispatcher {
    store: Arc<dyn Store>,
    http: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(store: Arc<dyn Store>) -> Result<Self, WebhookError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(WebhookError::ClientBuild)?;
        Ok(Self { store, http })
    }

    async fn tenant_config(&self, username: &str) -> Result<Option<TenantConfig>, WebhookError> {
        Ok(self.store.get_tenant_config(username).await?)
    }

    fn is_excluded(config: &TenantConfig, event: &str, data: &serde_json::Value) -> bool {
        if event != "message.received" {
            return false;
        }
        let Some(from) = data.get("message").and_then(|m| m.get("from")).and_then(|f| f.as_str()) else {
            return false;
        };
        config.is_excluded(&derive_e164(from))
    }

    async fn deliver_one(http: reqwest::Client, webhook: Webhook, payload_bytes: Vec<u8>, event: String, username: String) {
        let mut mac = match HmacSha256::new_from_slice(webhook.secret.as_bytes()) {
            Ok(mac) => mac,
            Err(err) => {
                tracing::warn!(webhook_id = %webhook.id, error = %err, "invalid webhook secret length");
                return;
            }
        };
        mac.update(&payload_bytes);
        let signature = hex::encode(mac.finalize().into_bytes());

        let result = http
            .post(&webhook.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .header("X-Event-Type", &event)
            .header("X-Username", &username)
            .header("X-Webhook-Id", &webhook.id)
            .header("X-Webhook-Name", webhook.name.as_deref().unwrap_or_default())
            .header("X-Signature", format!("sha256={signature}"))
            .body(payload_bytes)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(
                    webhook_id = %webhook.id,
                    username = %username,
                    status = %resp.status(),
                    "webhook delivery returned a non-success status"
                );
            }
            Err(err) => {
                tracing::warn!(webhook_id = %webhook.id, username = %username, error = %err, "webhook delivery failed");
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookDispatcher {
    async fn notify(&self, username: &str, event: &str, data: serde_json::Value) {
        let config = match self.tenant_config(username).await {
            Ok(Some(config)) => config,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(username = %username, error = %err, "failed to load tenant config for webhook dispatch");
                return;
            }
        };

        let active: Vec<Webhook> = config.active_webhooks().cloned().collect();
        if active.is_empty() {
            return;
        }

        if Self::is_excluded(&config, event, &data) {
            return;
        }

        let timestamp = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();

        let mut handles = Vec::with_capacity(active.len());
        for webhook in active {
            let payload = WebhookPayload {
                event,
                username,
                timestamp: timestamp.clone(),
                data: data.clone(),
                webhook: WebhookRef {
                    id: &webhook.id,
                    name: webhook.name.as_deref(),
                    url: &webhook.url,
                },
            };
            let payload_bytes = match serde_json::to_vec(&payload) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(webhook_id = %webhook.id, error = %err, "failed to serialize webhook payload");
                    continue;
                }
            };

            let http = self.http.clone();
            let event = event.to_string();
            let username = username.to_string();
            handles.push(tokio::spawn(Self::deliver_one(http, webhook, payload_bytes, event, username)));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}
