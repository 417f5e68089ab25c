use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gw_log::{Checkpointer, LogTailReader};
use gw_queue::{BoundedQueue, EnqueueError};
use gw_telemetry::Metrics;
use gw_types::IngestRecord;
use tokio::sync::watch;

const CHECKPOINT_EVERY: u64 = 1000;
const ENQUEUE_POLL: Duration = Duration::from_millis(50);
const EOF_POLL: Duration = Duration::from_millis(200);
const EOF_IDLE: Duration = Duration::from_millis(300);

/// Tails the durable log from the last checkpoint, parses each line into an
/// [`IngestRecord`], and feeds it to the bounded queue, retrying the enqueue
/// until it's accepted. This is the single path that guarantees every
/// durably-logged record eventually reaches a worker — the producer's
/// direct `try_enqueue` is only a latency optimization.
pub async fn run_replay_loop(
    log_path: PathBuf,
    checkpointer: Checkpointer,
    queue: Arc<BoundedQueue<IngestRecord>>,
    metrics: Metrics,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut reader = loop {
        if *shutdown.borrow() {
            return;
        }
        let log_size = tokio::fs::metadata(&log_path)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        let start_offset = checkpointer.load_clamped(log_size).await;
        match LogTailReader::open(&log_path, start_offset).await {
            Ok(reader) => break reader,
            Err(_) => tokio::time::sleep(EOF_IDLE).await,
        }
    };

    let mut since_checkpoint: u64 = 0;

    loop {
        if *shutdown.borrow() {
            let _ = checkpointer.save(reader.offset()).await;
            return;
        }

        match reader.next_line().await {
            Ok(Some((line, _))) => match serde_json::from_str::<IngestRecord>(&line) {
                Ok(record) => {
                    loop {
                        match queue.try_enqueue(record.clone()) {
                            Ok(()) => break,
                            Err(EnqueueError::Full) => tokio::time::sleep(ENQUEUE_POLL).await,
                            Err(EnqueueError::Closed) => return,
                        }
                    }
                    metrics.record_enqueued(1);
                    since_checkpoint += 1;
                    if since_checkpoint >= CHECKPOINT_EVERY {
                        let _ = checkpointer.save(reader.offset()).await;
                        metrics.set_checkpoint_offset(reader.offset() as i64);
                        since_checkpoint = 0;
                    }
                }
                Err(err) => {
                    metrics.record_replay_parse_error();
                    tracing::warn!(
                        offset = reader.offset(),
                        error = %err,
                        "skipping unparseable replay line"
                    );
                    let _ = checkpointer.save(reader.offset()).await;
                    metrics.set_checkpoint_offset(reader.offset() as i64);
                    since_checkpoint = 0;
                }
            },
            Ok(None) => {
                let _ = checkpointer.save(reader.offset()).await;
                metrics.set_checkpoint_offset(reader.offset() as i64);
                since_checkpoint = 0;

                tokio::time::sleep(EOF_POLL).await;
                let grown = tokio::fs::metadata(&log_path)
                    .await
                    .map(|meta| meta.len())
                    .unwrap_or(0)
                    > reader.offset();
                if !grown {
                    tokio::time::sleep(EOF_IDLE).await;
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "replay loop io error reading durable log");
                tokio::time::sleep(EOF_IDLE).await;
            }
        }
    }
}
