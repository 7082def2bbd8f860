//! Shared Tier (L2)
//!
//! The larger shared/distributed cache store, authoritative for TTL
//! bookkeeping. The backend is pluggable behind [`SharedBackend`]; the
//! in-memory implementation serves tests and embedded deployments.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::pattern::glob_match;

/// Shared tier storage capability set
///
/// Implementations back this with a networked store (e.g. Redis) or the
/// in-memory reference. All operations may fail transiently; callers
/// decide whether to degrade or propagate.
#[async_trait]
pub trait SharedBackend: Send + Sync {
    /// Get a value; expired entries read as absent
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a value with an optional TTL (authoritative)
    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;

    /// Delete a key, reporting whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete all keys matching a glob pattern, returning the count
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64>;

    /// Remaining TTL of a key; `None` when absent or without TTL
    async fn ttl_of(&self, key: &str) -> Result<Option<Duration>>;

    /// Replace a key's TTL, reporting whether the key existed
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Drop every entry
    async fn flush_all(&self) -> Result<()>;

    /// Live keys matching a glob pattern
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;

    /// Approximate number of stored entries
    async fn approximate_size(&self) -> Result<u64>;

    /// Operation counters
    fn stats(&self) -> SharedBackendStats;
}

/// Shared backend operation counters
#[derive(Debug, Clone, Default)]
pub struct SharedBackendStats {
    /// Successful reads of a live entry
    pub hits: u64,
    /// Reads of an absent or expired entry
    pub misses: u64,
    /// Explicit deletes plus lazy-expiry removals
    pub evictions: u64,
    /// Write operations
    pub writes: u64,
}

/// In-memory shared backend
///
/// DashMap-based, with lazy expiry: entries past their deadline are
/// removed the next time any operation touches them.
pub struct InMemorySharedBackend {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    writes: AtomicU64,
}

impl Default for InMemorySharedBackend {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }
}

impl InMemorySharedBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove an entry known to be expired
    fn drop_expired(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl SharedBackend for InMemorySharedBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                entry.touch();
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some((*entry).value().clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.drop_expired(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let matched: Vec<String> = self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0u64;
        for key in matched {
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn ttl_of(&self, key: &str) -> Result<Option<Duration>> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(entry.remaining_ttl()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.drop_expired(key);
        }
        Ok(None)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.set_expiry(Some(ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn flush_all(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()) && !e.value().is_expired())
            .map(|e| e.key().clone())
            .collect())
    }

    async fn approximate_size(&self) -> Result<u64> {
        Ok(self.entries.len() as u64)
    }

    fn stats(&self) -> SharedBackendStats {
        SharedBackendStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
