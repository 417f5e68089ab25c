//! The durable log (component A) and its byte-offset checkpointer
//! (component B).
//!
//! The durable log is the at-least-once anchor of the whole pipeline: an
//! `append` only returns success after the record's bytes have been
//! fsynced, so once a producer sees `Ok`, the record survives a crash.
//! Everything downstream — the bounded queue, the worker pool, the replay
//! loop — is best-effort relative to this file.

mod checkpoint;
mod durable_log;
mod tail_reader;

pub use checkpoint::Checkpointer;
pub use durable_log::DurableLog;
pub use tail_reader::LogTailReader;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize ingest record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("log line was not valid utf-8: {0}")]
    InvalidUtf8(String),
}
