//! Placeholder [`UpstreamConnector`]: the concrete WhatsApp-protocol client
//! library is an external collaborator this workspace does not vendor (see
//! the upstream-socket abstraction in `gw-session`). Wire a real connector
//! here once one is available; until then the composition root still
//! starts, serves `/health`/`/ready`/`/metrics`, and accepts tenants that
//! simply never reach `Connected`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gw_session::{UpstreamConnector, UpstreamError, UpstreamEvent, UpstreamSocket};
use tokio::sync::mpsc;

pub struct NullUpstreamConnector;

#[async_trait]
impl UpstreamConnector for NullUpstreamConnector {
    async fn connect(
        &self,
        username: &str,
        _session_path: &Path,
        _is_reconnect: bool,
    ) -> Result<(Arc<dyn UpstreamSocket>, mpsc::Receiver<UpstreamEvent>), UpstreamError> {
        tracing::warn!(username, "no upstream connector configured; refusing to connect");
        Err(UpstreamError::Other(
            "no upstream connector wired into this deployment".to_string(),
        ))
    }

    fn has_credentials(&self, _session_path: &Path) -> bool {
        false
    }
}
