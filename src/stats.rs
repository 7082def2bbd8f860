//! Statistics Recorder
//!
//! Global atomic counters plus per-key access history. Safe under
//! concurrent increment without a global lock; every read path produces
//! a point-in-time snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, trace};

/// Efficiency score at or above which the cache counts as healthy
const HEALTHY_EFFICIENCY: f64 = 80.0;

/// Per-key access history
#[derive(Debug)]
struct AccessRecord {
    hits: AtomicU64,
    misses: AtomicU64,
    accesses: AtomicU64,
    last_access: Mutex<Instant>,
}

impl Default for AccessRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessRecord {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            accesses: AtomicU64::new(0),
            last_access: Mutex::new(Instant::now()),
        }
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        self.accesses.fetch_add(1, Ordering::Relaxed);
        *self.last_access.lock() = Instant::now();
    }
}

/// Point-in-time view of one key's history
#[derive(Debug, Clone)]
pub struct KeyAccessSnapshot {
    /// The cache key
    pub key: String,
    /// Hits recorded for this key
    pub hits: u64,
    /// Misses recorded for this key
    pub misses: u64,
    /// Total recorded accesses
    pub accesses: u64,
    /// Most recent access instant
    pub last_access: Instant,
}

/// Aggregated cache performance statistics
#[derive(Debug, Clone)]
pub struct CachePerformanceStatistics {
    /// Total recorded hits
    pub total_hits: u64,
    /// Total recorded misses
    pub total_misses: u64,
    /// Hits plus misses
    pub total_requests: u64,
    /// Total recorded puts
    pub total_puts: u64,
    /// Total recorded evictions
    pub total_evictions: u64,
    /// Hit rate as a percentage
    pub hit_rate: f64,
    /// Miss rate as a percentage
    pub miss_rate: f64,
    /// Number of keys with recorded history
    pub tracked_keys: usize,
    /// Most accessed keys, descending
    pub top_accessed_keys: Vec<String>,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

/// Aggregated statistics for one key-prefix namespace
#[derive(Debug, Clone)]
pub struct NamespaceStatistics {
    /// The prefix that was aggregated
    pub namespace: String,
    /// Tracked keys under the prefix
    pub total_keys: usize,
    /// Hits across those keys
    pub total_hits: u64,
    /// Misses across those keys
    pub total_misses: u64,
    /// Hit rate as a percentage
    pub hit_rate: f64,
    /// The key with the highest access count, if any
    pub most_accessed_key: Option<String>,
}

/// Concurrent cache statistics recorder
#[derive(Debug, Default)]
pub struct StatisticsRecorder {
    access_history: DashMap<String, AccessRecord>,
    total_hits: AtomicU64,
    total_misses: AtomicU64,
    total_puts: AtomicU64,
    total_evictions: AtomicU64,
}

impl StatisticsRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit for a key
    pub fn record_hit(&self, key: &str) {
        self.total_hits.fetch_add(1, Ordering::Relaxed);
        self.update_record(key, true);
        trace!(key, "cache hit");
    }

    /// Record a cache miss for a key
    pub fn record_miss(&self, key: &str) {
        self.total_misses.fetch_add(1, Ordering::Relaxed);
        self.update_record(key, false);
        trace!(key, "cache miss");
    }

    /// Record a cache put
    pub fn record_put(&self, key: &str) {
        self.total_puts.fetch_add(1, Ordering::Relaxed);
        trace!(key, "cache put");
    }

    /// Record a cache eviction
    pub fn record_eviction(&self, key: &str) {
        self.total_evictions.fetch_add(1, Ordering::Relaxed);
        trace!(key, "cache eviction");
    }

    fn update_record(&self, key: &str, hit: bool) {
        self.access_history
            .entry(key.to_string())
            .or_default()
            .record(hit);
    }

    /// Comprehensive statistics snapshot
    pub fn statistics(&self) -> CachePerformanceStatistics {
        let hits = self.total_hits.load(Ordering::Relaxed);
        let misses = self.total_misses.load(Ordering::Relaxed);

        CachePerformanceStatistics {
            total_hits: hits,
            total_misses: misses,
            total_requests: hits + misses,
            total_puts: self.total_puts.load(Ordering::Relaxed),
            total_evictions: self.total_evictions.load(Ordering::Relaxed),
            hit_rate: rate(hits, misses),
            miss_rate: rate(misses, hits),
            tracked_keys: self.access_history.len(),
            top_accessed_keys: self.ranked_keys(10, true),
            captured_at: Utc::now(),
        }
    }

    /// Aggregate statistics for keys sharing a prefix
    pub fn namespace_statistics(&self, namespace: &str) -> Option<NamespaceStatistics> {
        let records: Vec<KeyAccessSnapshot> = self
            .access_history
            .iter()
            .filter(|e| e.key().starts_with(namespace))
            .map(|e| snapshot_of(e.key(), e.value()))
            .collect();

        if records.is_empty() {
            return None;
        }

        let hits: u64 = records.iter().map(|r| r.hits).sum();
        let misses: u64 = records.iter().map(|r| r.misses).sum();
        let most_accessed = records
            .iter()
            .max_by_key(|r| r.accesses)
            .map(|r| r.key.clone());

        Some(NamespaceStatistics {
            namespace: namespace.to_string(),
            total_keys: records.len(),
            total_hits: hits,
            total_misses: misses,
            hit_rate: rate(hits, misses),
            most_accessed_key: most_accessed,
        })
    }

    /// Most accessed keys, descending
    pub fn hot_keys(&self, limit: usize) -> Vec<String> {
        self.ranked_keys(limit, true)
    }

    /// Least accessed keys, ascending
    pub fn cold_keys(&self, limit: usize) -> Vec<String> {
        self.ranked_keys(limit, false)
    }

    /// Access history snapshot for one key
    pub fn key_snapshot(&self, key: &str) -> Option<KeyAccessSnapshot> {
        self.access_history
            .get(key)
            .map(|r| snapshot_of(key, r.value()))
    }

    /// Efficiency score in [0, 100]; 0 with no recorded accesses
    pub fn efficiency_score(&self) -> f64 {
        let hits = self.total_hits.load(Ordering::Relaxed);
        let misses = self.total_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        (hits as f64 / total as f64) * 100.0
    }

    /// Whether the cache is performing well (efficiency >= 80)
    pub fn is_healthy(&self) -> bool {
        self.efficiency_score() >= HEALTHY_EFFICIENCY
    }

    /// Zero all counters and clear per-key history
    pub fn reset(&self) {
        self.total_hits.store(0, Ordering::Relaxed);
        self.total_misses.store(0, Ordering::Relaxed);
        self.total_puts.store(0, Ordering::Relaxed);
        self.total_evictions.store(0, Ordering::Relaxed);
        self.access_history.clear();
        info!("cache statistics reset");
    }

    fn ranked_keys(&self, limit: usize, descending: bool) -> Vec<String> {
        let mut keyed: Vec<(String, u64)> = self
            .access_history
            .iter()
            .map(|e| (e.key().clone(), e.value().accesses.load(Ordering::Relaxed)))
            .collect();

        if descending {
            keyed.sort_by(|a, b| b.1.cmp(&a.1));
        } else {
            keyed.sort_by(|a, b| a.1.cmp(&b.1));
        }
        keyed.truncate(limit);
        keyed.into_iter().map(|(key, _)| key).collect()
    }
}

fn snapshot_of(key: &str, record: &AccessRecord) -> KeyAccessSnapshot {
    KeyAccessSnapshot {
        key: key.to_string(),
        hits: record.hits.load(Ordering::Relaxed),
        misses: record.misses.load(Ordering::Relaxed),
        accesses: record.accesses.load(Ordering::Relaxed),
        last_access: *record.last_access.lock(),
    }
}

fn rate(part: u64, rest: u64) -> f64 {
    let total = part + rest;
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

// =============================================================================
// Tests
// =============================================================================
