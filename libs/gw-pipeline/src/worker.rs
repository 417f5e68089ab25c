use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use gw_config::RetryConfig;
use gw_dlq::DeadLetterLog;
use gw_queue::BoundedQueue;
use gw_store::Store;
use gw_telemetry::Metrics;
use gw_types::IngestRecord;
use rand::Rng;

use crate::{MAX_SPLIT_DEPTH, TRANSIENT_ERROR_MARKERS};

/// True when `message` contains (case-insensitively) any of
/// [`TRANSIENT_ERROR_MARKERS`].
pub fn is_transient_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_ERROR_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let base_ms = retry.base.as_millis() as f64;
    let max_ms = retry.max.as_millis() as f64;
    let exp = base_ms * 2f64.powi(attempt.saturating_sub(1) as i32);
    let capped = exp.min(max_ms);
    let jitter = if capped > 0.0 {
        rand::rng().random_range(0.0..(0.2 * capped))
    } else {
        0.0
    };
    Duration::from_millis((capped + jitter) as u64)
}

/// Persists one record with jittered exponential backoff until it succeeds,
/// hits a non-transient error, exhausts its attempt budget, or ages past the
/// retry horizon — whichever comes first. A final failure is written to the
/// dead-letter log.
async fn persist_with_retry(
    store: &dyn Store,
    metrics: &Metrics,
    dlq: &DeadLetterLog,
    retry: &RetryConfig,
    record: IngestRecord,
) {
    let mut attempt: u32 = 0;
    loop {
        let start = Instant::now();
        match store.save_message(&record).await {
            Ok(()) => {
                metrics.record_persisted(1);
                metrics.record_persist_latency_ms(start.elapsed().as_secs_f64() * 1000.0);
                return;
            }
            Err(err) => {
                let message = err.to_string();
                let transient = is_transient_error(&message);
                attempt += 1;
                let horizon_exceeded =
                    now_millis().saturating_sub(record.received_at) >= retry.max_horizon.as_millis() as i64;

                if !transient || attempt >= retry.max_attempts || horizon_exceeded {
                    let code = if transient { "E_RETRY_EXHAUSTED" } else { "E_POISON" };
                    tracing::warn!(
                        idempotency_key = %record.idempotency_key,
                        correlation_id = %record.correlation_id,
                        error = %message,
                        code,
                        "record dead-lettered"
                    );
                    metrics.record_dead_lettered(code);
                    if let Err(dlq_err) = dlq.publish(record, message, now_millis()).await {
                        tracing::error!(error = %dlq_err, "failed to write dead-letter entry");
                    }
                    return;
                }

                metrics.record_retried();
                tokio::time::sleep(backoff_delay(retry, attempt)).await;
            }
        }
    }
}

/// Binary-search failure isolation: attempt the whole batch once; on a
/// transient error for a batch of more than one record (and below the split
/// depth cap), split in half and recurse on each half independently. A
/// non-transient error, a single-record batch, or the depth cap falls
/// through to per-record retry.
pub fn persist_batch<'a>(
    store: &'a dyn Store,
    metrics: &'a Metrics,
    dlq: &'a DeadLetterLog,
    retry: &'a RetryConfig,
    records: Vec<IngestRecord>,
    depth: u32,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        if records.is_empty() {
            return;
        }
        let len = records.len();
        let start = Instant::now();
        match store.save_messages_batch(&records).await {
            Ok(()) => {
                metrics.record_persisted(len as u64);
                metrics.record_persist_latency_ms(start.elapsed().as_secs_f64() * 1000.0);
            }
            Err(err) => {
                let message = err.to_string();
                let transient = is_transient_error(&message);
                if transient && len > 1 && depth < MAX_SPLIT_DEPTH {
                    let mut records = records;
                    let second_half = records.split_off(len / 2);
                    persist_batch(store, metrics, dlq, retry, records, depth + 1).await;
                    persist_batch(store, metrics, dlq, retry, second_half, depth + 1).await;
                } else {
                    for record in records {
                        persist_with_retry(store, metrics, dlq, retry, record).await;
                    }
                }
            }
        }
    })
}

/// One worker's batching loop: accumulate records from `queue` until the
/// batch reaches `batch_size` or the oldest item in it has waited
/// `batch_max_wait`, then flush through [`persist_batch`]. Returns once the
/// queue is closed and fully drained.
pub async fn run_worker(
    worker_id: usize,
    queue: Arc<BoundedQueue<IngestRecord>>,
    store: Arc<dyn Store>,
    dlq: Arc<DeadLetterLog>,
    metrics: Metrics,
    retry: RetryConfig,
    batch_size: usize,
    batch_max_wait: Duration,
) {
    loop {
        let wait_start = Instant::now();
        let mut batch = Vec::with_capacity(batch_size);

        match queue.dequeue().await {
            Some(item) => batch.push(item),
            None => {
                tracing::info!(worker_id, "queue closed, worker stopping");
                return;
            }
        }

        let deadline = wait_start + batch_max_wait;
        let mut queue_closed = false;
        while batch.len() < batch_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, queue.dequeue()).await {
                Ok(Some(item)) => batch.push(item),
                Ok(None) => {
                    queue_closed = true;
                    break;
                }
                Err(_) => break,
            }
        }
        let wait_elapsed = wait_start.elapsed();

        metrics.set_queue_depth(queue.depth() as i64);

        let persist_start = Instant::now();
        let batch_len = batch.len();
        persist_batch(store.as_ref(), &metrics, dlq.as_ref(), &retry, batch, 0).await;
        let persist_elapsed = persist_start.elapsed();

        let total = wait_elapsed + persist_elapsed;
        if total > Duration::ZERO {
            metrics.record_worker_busy_fraction(persist_elapsed.as_secs_f64() / total.as_secs_f64());
        }

        tracing::debug!(worker_id, batch_len, "flushed batch");

        if queue_closed {
            return;
        }
    }
}
