//! Single configuration root (component K). `Config::from_env` is the only
//! place in the gateway that reads `std::env` for ingestion tunables; every
//! other module receives already-parsed values by parameter.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
    pub max_horizon: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub log_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub dlq_path: PathBuf,
    pub store_path: PathBuf,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_max_wait: Duration,
    pub workers: usize,
    pub retry: RetryConfig,
    pub ready_max_queue_depth: usize,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = env_path("GATEWAY_DATA_DIR", PathBuf::from("data"));

        let log_path = env_path(
            "INGEST_LOG_PATH",
            data_dir.join("ingestion.log"),
        );
        let checkpoint_path = env_path(
            "INGEST_CHECKPOINT_PATH",
            data_dir.join("ingestion.offset"),
        );
        let dlq_path = env_path("INGEST_DLQ_PATH", data_dir.join("dlq.log"));
        let store_path = env_path("GATEWAY_STORE_PATH", data_dir.join("gateway.sqlite3"));

        let queue_capacity = env_parse("INGEST_QUEUE_CAPACITY", 5000usize)?;
        let batch_size = env_parse("INGEST_BATCH_SIZE", 100usize)?;
        let batch_max_wait_ms = env_parse("INGEST_BATCH_MAX_WAIT_MS", 250u64)?;
        let workers = env_parse("INGEST_WORKERS", 2usize)?;

        let retry_base_ms = env_parse("INGEST_RETRY_BASE_MS", 100u64)?;
        let retry_max_ms = env_parse("INGEST_RETRY_MAX_MS", 5000u64)?;
        let retry_max_attempts = env_parse("INGEST_RETRY_MAX_ATTEMPTS", 10u32)?;
        let retry_max_horizon_ms = env_parse("INGEST_RETRY_MAX_HORIZON_MS", 600_000u64)?;

        let default_ready_depth = (queue_capacity as f64 * 0.9).floor() as usize;
        let ready_max_queue_depth = env_parse("INGEST_READY_MAX_QUEUE_DEPTH", default_ready_depth)?;

        let bind_addr =
            env::var("GATEWAY_BIND").unwrap_or_else(|_| "0.0.0.0:8088".to_string());

        if queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: "INGEST_QUEUE_CAPACITY",
                value: queue_capacity.to_string(),
                reason: "must be greater than zero",
            });
        }
        if workers == 0 {
            return Err(ConfigError::InvalidValue {
                name: "INGEST_WORKERS",
                value: workers.to_string(),
                reason: "must be greater than zero",
            });
        }
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "INGEST_BATCH_SIZE",
                value: batch_size.to_string(),
                reason: "must be greater than zero",
            });
        }

        Ok(Self {
            data_dir,
            log_path,
            checkpoint_path,
            dlq_path,
            store_path,
            queue_capacity,
            batch_size,
            batch_max_wait: Duration::from_millis(batch_max_wait_ms),
            workers,
            retry: RetryConfig {
                base: Duration::from_millis(retry_base_ms),
                max: Duration::from_millis(retry_max_ms),
                max_attempts: retry_max_attempts,
                max_horizon: Duration::from_millis(retry_max_horizon_ms),
            },
            ready_max_queue_depth,
            bind_addr,
        })
    }
}

fn env_path(name: &'static str, default: PathBuf) -> PathBuf {
    env::var(name).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(name) {
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name,
            value: raw,
            reason: "could not parse as the expected numeric type",
        }),
        Err(_) => Ok(default),
    }
}
