use std::env;

/// Telemetry knobs read once at process startup.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub json_logs: bool,
    pub env_filter: String,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let json_logs = env::var("LOG_FORMAT")
            .map(|v| !matches!(v.to_lowercase().as_str(), "text" | "pretty" | "plain"))
            .unwrap_or(true);
        let env_filter = env::var("RUST_LOG")
            .or_else(|_| env::var("LOG_LEVEL"))
            .unwrap_or_else(|_| "info".to_string());
        Self {
            json_logs,
            env_filter,
        }
    }
}
