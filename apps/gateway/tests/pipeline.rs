//! End-to-end coverage of the composition root's wiring: a tenant session's
//! events flowing through the durable log and bounded queue into the store,
//! crash/restart recovery via the replay loop, and a real webhook dispatcher
//! substituted in as the session's notifier.

use std::sync::Arc;
use std::time::Duration;

use gw_config::RetryConfig;
use gw_dlq::DeadLetterLog;
use gw_log::{Checkpointer, DurableLog};
use gw_pipeline::{run_replay_loop, run_worker};
use gw_queue::BoundedQueue;
use gw_session::{ConnectionState, TenantManager, UpstreamEvent, UpstreamMessage};
use gw_store::Store;
use gw_telemetry::Metrics;
use gw_testkit::{FakeConnector, InMemoryStore, RecordingNotifier};
use gw_types::{IngestRecord, MessageContent, MessageInfo, MessageType};
use gw_webhook::WebhookDispatcher;

fn retry_config() -> RetryConfig {
    RetryConfig {
        base: Duration::from_millis(1),
        max: Duration::from_millis(5),
        max_attempts: 3,
        max_horizon: Duration::from_secs(600),
    }
}

fn inbound_message(id: &str) -> MessageInfo {
    MessageInfo {
        id: id.to_string(),
        from: "15551234567@s.whatsapp.net".to_string(),
        from_me: false,
        timestamp: 1_700_000_000,
        message_type: MessageType::Text,
        push_name: Some("Jess".to_string()),
        content: MessageContent::Text {
            text: "hello from upstream".to_string(),
            context_info: None,
        },
    }
}

/// A connected tenant session that receives one live message ends up with
/// that message in the store and a "connection" event followed by a
/// "message.received" event on the notifier, in that order.
#[tokio::test]
async fn session_message_flows_through_log_queue_and_worker_into_store() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(DurableLog::open(dir.path().join("ingestion.log")).await.unwrap());
    let queue: Arc<BoundedQueue<IngestRecord>> = Arc::new(BoundedQueue::new(64));
    let store = InMemoryStore::new();
    let notifier = RecordingNotifier::new();
    let connector = FakeConnector::new();
    let dlq = Arc::new(DeadLetterLog::open(dir.path().join("dlq.log")).await.unwrap());
    let metrics = Metrics::new();

    let manager = TenantManager::new(
        dir.path().join("sessions"),
        connector.clone(),
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&queue),
        Arc::clone(&log),
        Arc::clone(&notifier) as Arc<dyn gw_session::Notifier>,
        metrics.clone(),
    );

    let worker = tokio::spawn(run_worker(
        0,
        Arc::clone(&queue),
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&dlq),
        metrics.clone(),
        retry_config(),
        10,
        Duration::from_millis(50),
    ));

    let _session = manager.connect("alice").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    connector.push_event(UpstreamEvent::MessagesUpsert {
        notify: true,
        messages: vec![UpstreamMessage::Chat(inbound_message("WA1"))],
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    queue.close().await;
    tokio::time::timeout(Duration::from_secs(2), worker).await.unwrap().unwrap();

    let stored = store.list_messages("15551234567@s.whatsapp.net", 10, None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, "WA1");

    let calls = notifier.calls.lock().unwrap();
    let events: Vec<&str> = calls.iter().map(|(_, event, _)| event.as_str()).collect();
    assert_eq!(events.first(), Some(&"connection"));
    assert!(events.contains(&"message.received"));
}

/// Records appended to the durable log but never handed to a worker before
/// a simulated crash are still persisted exactly once after the replay loop
/// and a fresh worker pick them back up.
#[tokio::test]
async fn replay_recovers_records_never_reaching_a_worker_before_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("ingestion.log");
    let log = DurableLog::open(&log_path).await.unwrap();
    log.append(&IngestRecord::new(inbound_message("R1"), 1_700_000_000_000)).await.unwrap();
    log.append(&IngestRecord::new(inbound_message("R2"), 1_700_000_000_100)).await.unwrap();
    drop(log);

    let checkpointer = Checkpointer::new(dir.path().join("ingestion.offset"));
    let queue: Arc<BoundedQueue<IngestRecord>> = Arc::new(BoundedQueue::new(16));
    let store = InMemoryStore::new();
    let dlq = Arc::new(DeadLetterLog::open(dir.path().join("dlq.log")).await.unwrap());
    let metrics = Metrics::new();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let replay = tokio::spawn(run_replay_loop(
        log_path.clone(),
        checkpointer,
        Arc::clone(&queue),
        metrics.clone(),
        shutdown_rx,
    ));
    let worker = tokio::spawn(run_worker(
        0,
        Arc::clone(&queue),
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&dlq),
        metrics.clone(),
        retry_config(),
        10,
        Duration::from_millis(50),
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();
    queue.close().await;

    tokio::time::timeout(Duration::from_secs(2), replay).await.unwrap().unwrap();
    tokio::time::timeout(Duration::from_secs(2), worker).await.unwrap().unwrap();

    let stored = store.list_messages("15551234567@s.whatsapp.net", 10, None).await.unwrap();
    let mut ids: Vec<&str> = stored.iter().map(|m| m.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["R1", "R2"]);
}

/// A record re-delivered by the replay loop after only a partial checkpoint
/// advance (as happens when a crash lands between persisting a batch and
/// saving the next checkpoint) is deduplicated by the store rather than
/// stored twice.
#[tokio::test]
async fn duplicate_redelivery_after_partial_checkpoint_is_deduplicated_by_store() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("ingestion.log");
    let log = DurableLog::open(&log_path).await.unwrap();
    log.append(&IngestRecord::new(inbound_message("D1"), 1_700_000_000_000)).await.unwrap();
    drop(log);

    let store = InMemoryStore::new();
    let dlq = Arc::new(DeadLetterLog::open(dir.path().join("dlq.log")).await.unwrap());
    let metrics = Metrics::new();
    let queue: Arc<BoundedQueue<IngestRecord>> = Arc::new(BoundedQueue::new(16));

    // First pass: replay delivers D1 and a worker persists it, but the
    // checkpoint is never saved (standing in for a crash before the
    // checkpoint write lands).
    let checkpoint_path = dir.path().join("ingestion.offset");
    let record = {
        let reader = gw_log::LogTailReader::open(&log_path, 0).await.unwrap();
        let mut reader = reader;
        let (line, _) = reader.next_line().await.unwrap().unwrap();
        serde_json::from_str::<IngestRecord>(&line).unwrap()
    };
    queue.try_enqueue(record.clone()).unwrap();
    let worker = tokio::spawn(run_worker(
        0,
        Arc::clone(&queue),
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&dlq),
        metrics.clone(),
        retry_config(),
        10,
        Duration::from_millis(50),
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;
    queue.close().await;
    tokio::time::timeout(Duration::from_secs(2), worker).await.unwrap().unwrap();

    // "Restart": the checkpoint on disk is still 0, so the replay loop reads
    // D1 again from the beginning of the log into a fresh queue.
    let checkpointer = Checkpointer::new(&checkpoint_path);
    let queue2: Arc<BoundedQueue<IngestRecord>> = Arc::new(BoundedQueue::new(16));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let replay = tokio::spawn(run_replay_loop(
        log_path.clone(),
        checkpointer,
        Arc::clone(&queue2),
        metrics.clone(),
        shutdown_rx,
    ));
    let worker2 = tokio::spawn(run_worker(
        1,
        Arc::clone(&queue2),
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&dlq),
        metrics.clone(),
        retry_config(),
        10,
        Duration::from_millis(50),
    ));
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();
    queue2.close().await;
    tokio::time::timeout(Duration::from_secs(2), replay).await.unwrap().unwrap();
    tokio::time::timeout(Duration::from_secs(2), worker2).await.unwrap().unwrap();

    let stored = store.list_messages("15551234567@s.whatsapp.net", 10, None).await.unwrap();
    assert_eq!(stored.len(), 1, "re-delivered record must not be stored twice");
}

/// A real `WebhookDispatcher` can stand in for the session's notifier: with
/// no tenant webhook configuration on file, connecting and receiving a
/// message is a safe no-op delivery-wise and the session still reaches
/// `Connected`.
#[tokio::test]
async fn webhook_dispatcher_is_a_drop_in_notifier_with_no_configured_webhooks() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(DurableLog::open(dir.path().join("ingestion.log")).await.unwrap());
    let queue: Arc<BoundedQueue<IngestRecord>> = Arc::new(BoundedQueue::new(64));
    let store = InMemoryStore::new();
    let connector = FakeConnector::new();
    let dispatcher = Arc::new(WebhookDispatcher::new(Arc::clone(&store) as Arc<dyn Store>).unwrap());
    let metrics = Metrics::new();

    let manager = TenantManager::new(
        dir.path().join("sessions"),
        connector.clone(),
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&queue),
        Arc::clone(&log),
        dispatcher as Arc<dyn gw_session::Notifier>,
        metrics.clone(),
    );

    let session = manager.connect("alice").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state().await, gw_session::SessionState::Connected);

    connector.push_event(UpstreamEvent::ConnectionUpdate {
        qr: None,
        state: ConnectionState::Open,
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state().await, gw_session::SessionState::Connected);
}
