//! Local Tier (L1)
//!
//! Fast in-process cache with its own bounded-size/short-TTL policy,
//! independent of the shared tier: entries expire after write, expire
//! after access, and over-capacity inserts evict the least recently
//! accessed entries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::trace;

use crate::entry::CacheEntry;
use crate::pattern::glob_match;

/// Local tier configuration
#[derive(Debug, Clone)]
pub struct LocalTierConfig {
    /// Maximum number of entries
    pub max_entries: usize,
    /// Expire after write
    pub ttl_write: Duration,
    /// Expire after access
    pub ttl_access: Duration,
}

impl Default for LocalTierConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl_write: Duration::from_secs(600),
            ttl_access: Duration::from_secs(300),
        }
    }
}

/// In-process cache tier
pub struct LocalTier {
    entries: DashMap<String, CacheEntry>,
    config: LocalTierConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LocalTier {
    /// Create a local tier with the given policy
    pub fn new(config: LocalTierConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a value, refreshing its access timestamp
    pub fn get(&self, key: &str) -> Option<Bytes> {
        match self.entries.get(key) {
            Some(entry) if !self.is_stale(&entry) => {
                entry.touch();
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some((*entry).value().clone());
            }
            Some(_) => {}
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        // Expired entries are removed lazily on read
        if self.entries.remove(key).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Read a live value without counting a hit or miss
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        self.entries
            .get(key)
            .filter(|entry| !self.is_stale(entry))
            .map(|entry| (*entry).value().clone())
    }

    /// Store a value
    ///
    /// The requested TTL is capped by the tier's expire-after-write bound
    /// so the local copy never outlives the tier policy.
    pub fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) {
        let effective_ttl = match ttl {
            Some(t) => t.min(self.config.ttl_write),
            None => self.config.ttl_write,
        };
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, Some(effective_ttl)));

        if self.entries.len() > self.config.max_entries {
            self.evict_excess();
        }
    }

    /// Remove a single key; idempotent
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove all keys matching a glob pattern, returning the count
    pub fn remove_by_pattern(&self, pattern: &str) -> usize {
        let matched: Vec<String> = self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in matched {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        trace!(pattern, removed, "local tier pattern removal");
        removed
    }

    /// Whether a live (unexpired) entry exists; does not refresh access
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !self.is_stale(&entry))
            .unwrap_or(false)
    }

    /// Keys currently matching a glob pattern
    pub fn keys_matching(&self, pattern: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()) && !self.is_stale(e.value()))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries (including not-yet-collected expired ones)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tier is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Eviction count (capacity and lazy-expiry removals)
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn is_stale(&self, entry: &CacheEntry) -> bool {
        entry.is_expired() || entry.idle_for() > self.config.ttl_access
    }

    /// Evict least-recently-accessed entries until back under capacity
    fn evict_excess(&self) {
        let over = self.entries.len().saturating_sub(self.config.max_entries);
        if over == 0 {
            return;
        }

        let mut candidates: Vec<(String, std::time::Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().last_accessed()))
            .collect();
        candidates.sort_by_key(|(_, accessed)| *accessed);

        let mut evicted = 0;
        for (key, _) in candidates {
            if evicted >= over {
                break;
            }
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                evicted += 1;
            }
        }
        trace!(evicted, "local tier capacity eviction");
    }
}

// =============================================================================
// Tests
// =============================================================================
