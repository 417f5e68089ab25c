//! The worker pool (component E) and replay loop (component F): the two
//! tasks that drain the bounded queue and the durable log respectively and
//! turn ingestion records into persisted rows.

mod replay;
mod worker;

pub use replay::run_replay_loop;
pub use worker::{is_transient_error, persist_batch, run_worker};

/// Recursion depth at which [`persist_batch`] gives up splitting and falls
/// through to per-record retry regardless of batch size.
pub const MAX_SPLIT_DEPTH: u32 = 20;

/// Substrings (case-insensitive) that mark a persistence error as transient
/// and therefore worth retrying.
pub const TRANSIENT_ERROR_MARKERS: [&str; 5] =
    ["busy", "locked", "timeout", "ioerr", "database is locked"];
