use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Installs the process-wide `tracing` subscriber. Safe to call once per
/// process; call it from the composition root before spawning any tasks.
pub fn init_tracing(cfg: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&cfg.env_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if cfg.json_logs {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
