//! Hot-Key Detector
//!
//! Counts every recorded access per key. Keys whose counters reach the
//! threshold enter a monotonic hot set: scan-based detection never
//! revokes membership, only an explicit clear does. The optional rolling
//! window clears the live counters (never the hot set) so long-running
//! processes do not accumulate stale heat.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tracing::debug;

/// Default access-count threshold for hotness
pub const DEFAULT_HOT_KEY_THRESHOLD: u64 = 20;

/// Detects frequently accessed cache keys
pub struct HotKeyDetector {
    counters: DashMap<String, AtomicU64>,
    hot_set: DashSet<String>,
    threshold: u64,
    window: Option<Duration>,
    window_started: Mutex<Instant>,
}

impl Default for HotKeyDetector {
    fn default() -> Self {
        Self::new(DEFAULT_HOT_KEY_THRESHOLD, None)
    }
}

impl HotKeyDetector {
    /// Create a detector with the given threshold and optional counter window
    pub fn new(threshold: u64, window: Option<Duration>) -> Self {
        Self {
            counters: DashMap::new(),
            hot_set: DashSet::new(),
            threshold,
            window,
            window_started: Mutex::new(Instant::now()),
        }
    }

    /// Record one access to a key, hit or miss alike
    pub fn record_access(&self, key: &str) {
        self.maybe_roll_window();
        self.counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Scan the counters and promote every key at or above the threshold
    ///
    /// Returns the keys that are hot after this scan. Promotion is
    /// monotonic: nothing is ever demoted here.
    pub fn detect_hot_keys(&self) -> Vec<String> {
        let mut promoted = 0usize;
        for entry in self.counters.iter() {
            if entry.value().load(Ordering::Relaxed) >= self.threshold
                && self.hot_set.insert(entry.key().clone())
            {
                promoted += 1;
            }
        }
        if promoted > 0 {
            debug!(promoted, hot_keys = self.hot_set.len(), "hot key scan");
        }
        self.hot_set.iter().map(|k| k.clone()).collect()
    }

    /// Whether a key is hot: already in the hot set, or its live counter
    /// has reached the threshold
    pub fn is_hot_key(&self, key: &str) -> bool {
        if self.hot_set.contains(key) {
            return true;
        }
        self.counters
            .get(key)
            .map(|c| c.load(Ordering::Relaxed) >= self.threshold)
            .unwrap_or(false)
    }

    /// Live access count for a key
    pub fn access_count(&self, key: &str) -> u64 {
        self.counters
            .get(key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Most counted keys, descending
    pub fn top_hot_keys(&self, limit: usize) -> Vec<String> {
        let mut keyed: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();
        keyed.sort_by(|a, b| b.1.cmp(&a.1));
        keyed.truncate(limit);
        keyed.into_iter().map(|(key, _)| key).collect()
    }

    /// Number of keys in the monotonic hot set
    pub fn hot_key_count(&self) -> usize {
        self.hot_set.len()
    }

    /// The configured threshold
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Reset both the live counters and the hot set
    pub fn clear_access_counts(&self) {
        self.counters.clear();
        self.hot_set.clear();
        *self.window_started.lock() = Instant::now();
    }

    /// Roll the counting window when it has elapsed; hot set untouched
    fn maybe_roll_window(&self) {
        let Some(window) = self.window else {
            return;
        };
        let mut started = self.window_started.lock();
        if started.elapsed() >= window {
            self.counters.clear();
            *started = Instant::now();
            debug!("hot key counter window rolled");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
