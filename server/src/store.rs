//! Thin adapter over the external key-value store.
//!
//! Matchmaking queues and session records go through this trait so the core
//! never depends on a concrete backend. The contract is small: string keys
//! with TTL, plus sorted sets ordered by ascending score. [`MemoryStore`] is
//! the mandatory in-process fallback; a networked implementation can slot in
//! behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Required store capabilities: TTL'd keys and score-ordered sets.
///
/// `z_range(_, 0, -1)` returns the whole set; negative indices count from
/// the end as in the usual sorted-set convention.
pub trait KeyValueStore: Send + Sync {
    fn set_ex(&self, key: &str, ttl_seconds: u64, value: &str);
    fn get(&self, key: &str) -> Option<String>;
    fn del(&self, key: &str) -> bool;
    fn ping(&self) -> bool;

    fn z_add(&self, set: &str, score: f64, value: &str);
    fn z_range(&self, set: &str, start: i64, stop: i64) -> Vec<String>;
    fn z_rem(&self, set: &str, values: &[&str]) -> usize;
    fn z_card(&self, set: &str) -> usize;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    keys: HashMap<String, Entry>,
    /// Sorted sets as (score, value) pairs kept in ascending score order;
    /// ties break by insertion order, which keeps FIFO queues fair.
    sets: HashMap<String, Vec<(f64, String)>>,
}

/// Single-writer in-memory store behind one mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn set_ex(&self, key: &str, ttl_seconds: u64, value: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.keys.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
                },
            );
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().ok()?;
        match inner.keys.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                // Lazy expiry on access.
                inner.keys.remove(key);
                None
            }
            None => None,
        }
    }

    fn del(&self, key: &str) -> bool {
        self.inner
            .lock()
            .map(|mut inner| inner.keys.remove(key).is_some())
            .unwrap_or(false)
    }

    fn ping(&self) -> bool {
        self.inner.lock().is_ok()
    }

    fn z_add(&self, set: &str, score: f64, value: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            let entries = inner.sets.entry(set.to_string()).or_default();
            entries.retain(|(_, v)| v != value);
            let at = entries
                .iter()
                .position(|(s, _)| *s > score)
                .unwrap_or(entries.len());
            entries.insert(at, (score, value.to_string()));
        }
    }

    fn z_range(&self, set: &str, start: i64, stop: i64) -> Vec<String> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        let Some(entries) = inner.sets.get(set) else {
            return Vec::new();
        };
        let len = entries.len() as i64;
        let resolve = |idx: i64| -> i64 {
            if idx < 0 {
                (len + idx).max(0)
            } else {
                idx
            }
        };
        let from = resolve(start).min(len);
        let to = (resolve(stop) + 1).min(len);
        if from >= to {
            return Vec::new();
        }
        entries[from as usize..to as usize]
            .iter()
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn z_rem(&self, set: &str, values: &[&str]) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let Some(entries) = inner.sets.get_mut(set) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|(_, v)| !values.contains(&v.as_str()));
        before - entries.len()
    }

    fn z_card(&self, set: &str) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.sets.get(set).map(|e| e.len()))
            .unwrap_or(0)
    }
}
