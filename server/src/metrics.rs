//! Event-loop observability counters.
//!
//! Cheap enough to update on every message: four atomic totals, a bounded
//! ring of handling-time samples per event for percentile queries, and the
//! connection gauges the status log line prints. Nothing here is on the
//! simulation path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Handling-time samples kept per event name.
const SAMPLE_CAP: usize = 256;

#[derive(Debug, Default)]
struct EventStats {
    count: u64,
    /// Microsecond samples, overwritten oldest-first past the cap.
    samples_us: Vec<u64>,
    next_slot: usize,
}

impl EventStats {
    fn record(&mut self, duration_us: u64) {
        self.count += 1;
        if self.samples_us.len() < SAMPLE_CAP {
            self.samples_us.push(duration_us);
        } else {
            self.samples_us[self.next_slot] = duration_us;
            self.next_slot = (self.next_slot + 1) % SAMPLE_CAP;
        }
    }

    fn percentile(&self, p: f64) -> u64 {
        if self.samples_us.is_empty() {
            return 0;
        }
        let mut sorted = self.samples_us.clone();
        sorted.sort_unstable();
        let rank = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[rank]
    }
}

/// Connection gauges reported alongside the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionGauges {
    pub total: usize,
    pub authenticated: usize,
    pub in_room: usize,
}

/// Percentiles for one event name.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTiming {
    pub event: String,
    pub count: u64,
    pub p50_us: u64,
    pub p95_us: u64,
}

/// Point-in-time metrics view.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub processed: u64,
    pub rejected: u64,
    pub validation_errors: u64,
    pub rate_limited: u64,
    pub events_per_sec: f64,
    pub timings: Vec<EventTiming>,
}

/// Shared counters; every field is independently updatable from any task.
pub struct Metrics {
    processed: AtomicU64,
    rejected: AtomicU64,
    validation_errors: AtomicU64,
    rate_limited: AtomicU64,
    per_event: Mutex<HashMap<String, EventStats>>,
    started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            per_event: Mutex::new(HashMap::new()),
            started: Instant::now(),
        }
    }

    /// Records a successfully handled event and its handling time.
    pub fn record_processed(&self, event: &str, duration_us: u64) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut map) = self.per_event.lock() {
            map.entry(event.to_string()).or_default().record(duration_us);
        }
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_error(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> MetricsReport {
        let processed = self.processed.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64().max(1e-6);
        let timings = self
            .per_event
            .lock()
            .map(|map| {
                let mut timings: Vec<EventTiming> = map
                    .iter()
                    .map(|(event, stats)| EventTiming {
                        event: event.clone(),
                        count: stats.count,
                        p50_us: stats.percentile(0.50),
                        p95_us: stats.percentile(0.95),
                    })
                    .collect();
                timings.sort_by(|a, b| b.count.cmp(&a.count));
                timings
            })
            .unwrap_or_default();

        MetricsReport {
            processed,
            rejected: self.rejected.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            events_per_sec: processed as f64 / elapsed,
            timings,
        }
    }
}
