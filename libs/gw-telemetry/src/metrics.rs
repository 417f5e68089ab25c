use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;

const LATENCY_WINDOW_CAPACITY: usize = 5000;

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    enqueued: AtomicU64,
    persisted: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    replay_parse_error: AtomicU64,
    log_append_failed: AtomicU64,
}

struct Inner {
    counters: Counters,
    error_codes: DashMap<String, AtomicU64>,
    latency_samples_ms: Mutex<VecDeque<f64>>,
    queue_depth: AtomicI64,
    checkpoint_offset: AtomicI64,
    worker_utilization: Mutex<f64>,
}

/// Shared, cheaply-cloneable registry of ingestion counters, gauges, and
/// latency samples. One instance is constructed at startup and handed to
/// every component that reports a metric.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Inner>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                counters: Counters::default(),
                error_codes: DashMap::new(),
                latency_samples_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_CAPACITY)),
                queue_depth: AtomicI64::new(0),
                checkpoint_offset: AtomicI64::new(0),
                worker_utilization: Mutex::new(0.0),
            }),
        }
    }

    pub fn record_received(&self) {
        self.inner.counters.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueued(&self, n: u64) {
        self.inner.counters.enqueued.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_persisted(&self, n: u64) {
        self.inner
            .counters
            .persisted
            .fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.inner.counters.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self, code: &str) {
        self.inner
            .counters
            .dead_lettered
            .fetch_add(1, Ordering::Relaxed);
        self.record_error_code(code);
    }

    pub fn record_replay_parse_error(&self) {
        self.inner
            .counters
            .replay_parse_error
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_log_append_failed(&self) {
        self.inner
            .counters
            .log_append_failed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error_code(&self, code: &str) {
        self.inner
            .error_codes
            .entry(code.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Records one persistence-latency sample in milliseconds. The window
    /// keeps at most the most recent `LATENCY_WINDOW_CAPACITY` samples.
    pub fn record_persist_latency_ms(&self, millis: f64) {
        let mut samples = self
            .inner
            .latency_samples_ms
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        if samples.len() >= LATENCY_WINDOW_CAPACITY {
            samples.pop_front();
        }
        samples.push_back(millis);
    }

    pub fn set_queue_depth(&self, depth: i64) {
        self.inner.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn queue_depth(&self) -> i64 {
        self.inner.queue_depth.load(Ordering::Relaxed)
    }

    pub fn set_checkpoint_offset(&self, offset: i64) {
        self.inner
            .checkpoint_offset
            .store(offset, Ordering::Relaxed);
    }

    /// Folds one worker's instantaneous busy-fraction into the shared
    /// exponential moving average of worker utilization.
    pub fn record_worker_busy_fraction(&self, fraction: f64) {
        const ALPHA: f64 = 0.2;
        let mut avg = self
            .inner
            .worker_utilization
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        *avg = ALPHA * fraction.clamp(0.0, 1.0) + (1.0 - ALPHA) * *avg;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self
            .inner
            .latency_samples_ms
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let p50 = percentile(&sorted, 0.50);
        let p95 = percentile(&sorted, 0.95);
        drop(samples);

        let error_codes = self
            .inner
            .error_codes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            received: self.inner.counters.received.load(Ordering::Relaxed),
            enqueued: self.inner.counters.enqueued.load(Ordering::Relaxed),
            persisted: self.inner.counters.persisted.load(Ordering::Relaxed),
            retried: self.inner.counters.retried.load(Ordering::Relaxed),
            dead_lettered: self.inner.counters.dead_lettered.load(Ordering::Relaxed),
            replay_parse_error: self
                .inner
                .counters
                .replay_parse_error
                .load(Ordering::Relaxed),
            log_append_failed: self
                .inner
                .counters
                .log_append_failed
                .load(Ordering::Relaxed),
            error_codes,
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
            worker_utilization: *self
                .inner
                .worker_utilization
                .lock()
                .unwrap_or_else(|err| err.into_inner()),
            persist_latency_p50_ms: p50,
            persist_latency_p95_ms: p95,
            checkpoint_offset: self.inner.checkpoint_offset.load(Ordering::Relaxed),
        }
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Point-in-time view of the metrics registry, suitable for JSON rendering
/// by a `/metrics` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub enqueued: u64,
    pub persisted: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub replay_parse_error: u64,
    pub log_append_failed: u64,
    pub error_codes: std::collections::HashMap<String, u64>,
    pub queue_depth: i64,
    pub worker_utilization: f64,
    pub persist_latency_p50_ms: f64,
    pub persist_latency_p95_ms: f64,
    pub checkpoint_offset: i64,
}
