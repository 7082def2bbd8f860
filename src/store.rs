//! Tiered Store
//!
//! Composes the local and shared tiers into one read/write surface:
//! reads fall through L1 to L2 and populate L1 on the way back, writes
//! go through to both tiers. Tiers are never updated atomically; a
//! crash between tier writes leaves them to reconverge through TTLs.
//!
//! Shared-tier failures degrade reads to local-only (counted, logged)
//! but propagate from writes and evictions, where silent loss would
//! leave stale data live.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::hotkey::HotKeyDetector;
use crate::local::{LocalTier, LocalTierConfig};
use crate::shared::{SharedBackend, SharedBackendStats};
use crate::stats::StatisticsRecorder;

/// Which tier served a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// In-process tier
    Local,
    /// Shared/distributed tier
    Shared,
}

/// Outcome of a tiered lookup
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Value found, with the tier that served it
    Hit {
        /// The cached payload
        value: Bytes,
        /// Serving tier
        tier: Tier,
    },
    /// Not present in any tier
    Miss,
}

impl Lookup {
    /// The value, if this was a hit
    pub fn into_value(self) -> Option<Bytes> {
        match self {
            Lookup::Hit { value, .. } => Some(value),
            Lookup::Miss => None,
        }
    }
}

/// Combined view of both tiers' counters
#[derive(Debug, Clone, Default)]
pub struct TierStatistics {
    /// Local tier hits
    pub local_hits: u64,
    /// Local tier misses
    pub local_misses: u64,
    /// Local tier evictions
    pub local_evictions: u64,
    /// Entries currently in the local tier
    pub local_size: u64,
    /// Shared backend counters (zeroed when the backend is unreachable)
    pub shared: SharedBackendStats,
    /// Approximate shared entry count (zero when unreachable)
    pub shared_size: u64,
    /// Shared-tier operations degraded or failed
    pub shared_errors: u64,
}

/// Two-tier cache store
pub struct TieredStore {
    local: LocalTier,
    shared: Arc<dyn SharedBackend>,
    recorder: Arc<StatisticsRecorder>,
    hot_keys: Arc<HotKeyDetector>,
    default_ttl: Duration,
    shared_errors: AtomicU64,
    // Per-key guards so concurrent loads of the same key coalesce
    inflight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl TieredStore {
    /// Build a store over the given shared backend
    pub fn new(
        local_config: LocalTierConfig,
        shared: Arc<dyn SharedBackend>,
        recorder: Arc<StatisticsRecorder>,
        hot_keys: Arc<HotKeyDetector>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            local: LocalTier::new(local_config),
            shared,
            recorder,
            hot_keys,
            default_ttl,
            shared_errors: AtomicU64::new(0),
            inflight: DashMap::new(),
        }
    }

    /// Look a key up, falling through L1 to L2
    ///
    /// An L2 hit repopulates L1 under the remaining shared TTL. A
    /// shared-tier failure is counted and served as a miss so callers
    /// keep working off the local tier.
    pub async fn lookup(&self, key: &str) -> Lookup {
        self.hot_keys.record_access(key);

        if let Some(value) = self.local.get(key) {
            self.recorder.record_hit(key);
            return Lookup::Hit {
                value,
                tier: Tier::Local,
            };
        }

        match self.shared.get(key).await {
            Ok(Some(value)) => {
                self.recorder.record_hit(key);
                let remaining = self.shared_ttl_or_none(key).await;
                self.local.put(key, value.clone(), remaining);
                Lookup::Hit {
                    value,
                    tier: Tier::Shared,
                }
            }
            Ok(None) => {
                self.recorder.record_miss(key);
                Lookup::Miss
            }
            Err(err) => {
                self.note_shared_error("get", key, &err);
                self.recorder.record_miss(key);
                Lookup::Miss
            }
        }
    }

    /// Look a key up, discarding which tier served it
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.lookup(key).await.into_value()
    }

    /// Write a value through both tiers
    ///
    /// The shared tier is written first; if that fails the local tier is
    /// left untouched and the error propagates.
    pub async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let effective_ttl = ttl.unwrap_or(self.default_ttl);
        self.shared
            .put(key, value.clone(), Some(effective_ttl))
            .await
            .map_err(|err| {
                self.shared_errors.fetch_add(1, Ordering::Relaxed);
                err
            })?;
        self.local.put(key, value, Some(effective_ttl));
        self.recorder.record_put(key);
        Ok(())
    }

    /// Remove a key from both tiers
    pub async fn evict(&self, key: &str) -> Result<bool> {
        let local_removed = self.local.remove(key);
        let shared_removed = self.shared.delete(key).await.map_err(|err| {
            self.shared_errors.fetch_add(1, Ordering::Relaxed);
            err
        })?;
        if local_removed || shared_removed {
            self.recorder.record_eviction(key);
        }
        Ok(local_removed || shared_removed)
    }

    /// Remove every key matching a glob pattern from both tiers
    ///
    /// Returns the number of shared-tier entries removed.
    pub async fn evict_pattern(&self, pattern: &str) -> Result<u64> {
        let local_removed = self.local.remove_by_pattern(pattern);
        let shared_removed = self.shared.delete_by_pattern(pattern).await.map_err(|err| {
            self.shared_errors.fetch_add(1, Ordering::Relaxed);
            err
        })?;
        debug!(pattern, local_removed, shared_removed, "pattern eviction");
        Ok(shared_removed)
    }

    /// Drop everything from both tiers
    pub async fn clear(&self) -> Result<()> {
        self.local.clear();
        self.shared.flush_all().await.map_err(|err| {
            self.shared_errors.fetch_add(1, Ordering::Relaxed);
            err
        })
    }

    /// Whether a live entry exists in either tier; does not count as an
    /// access
    pub async fn has_key(&self, key: &str) -> bool {
        if self.local.contains(key) {
            return true;
        }
        match self.shared.keys_matching(key).await {
            Ok(keys) => !keys.is_empty(),
            Err(err) => {
                self.note_shared_error("has_key", key, &err);
                false
            }
        }
    }

    /// Remaining TTL as recorded by the authoritative shared tier
    pub async fn get_ttl(&self, key: &str) -> Option<Duration> {
        self.shared_ttl_or_none(key).await
    }

    /// Lengthen a key's shared-tier TTL to `ttl`
    ///
    /// Extension only: a key whose remaining TTL already meets or
    /// exceeds `ttl`, has no TTL at all, or is absent, is left alone.
    pub async fn extend_ttl(&self, key: &str, ttl: Duration) -> Result<bool> {
        let current = self.shared.ttl_of(key).await.map_err(|err| {
            self.shared_errors.fetch_add(1, Ordering::Relaxed);
            err
        })?;
        match current {
            Some(remaining) if remaining < ttl => {
                let extended = self.shared.expire(key, ttl).await.map_err(|err| {
                    self.shared_errors.fetch_add(1, Ordering::Relaxed);
                    err
                })?;
                Ok(extended)
            }
            _ => Ok(false),
        }
    }

    /// Get a value, loading and caching it on a miss
    ///
    /// Concurrent callers for the same key coalesce onto one loader
    /// invocation; the rest wait and read the freshly cached value.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<Bytes>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let guard = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _held = guard.lock().await;

        // Another caller may have populated the key while we waited;
        // re-check quietly so one logical miss is recorded once
        let result = match self.recheck(key).await {
            Some(value) => Ok(value),
            None => match loader().await {
                Ok(value) => {
                    self.put(key, value.clone(), ttl).await?;
                    Ok(value)
                }
                Err(err) => Err(err),
            },
        };

        drop(_held);
        self.inflight
            .remove_if(key, |_, lock| Arc::strong_count(lock) <= 2);
        result
    }

    /// Tier fallback without touching the recorder or hot-key counters
    async fn recheck(&self, key: &str) -> Option<Bytes> {
        if let Some(value) = self.local.peek(key) {
            return Some(value);
        }
        match self.shared.get(key).await {
            Ok(Some(value)) => {
                let remaining = self.shared_ttl_or_none(key).await;
                self.local.put(key, value.clone(), remaining);
                Some(value)
            }
            Ok(None) => None,
            Err(err) => {
                self.note_shared_error("get", key, &err);
                None
            }
        }
    }

    /// Live shared-tier keys matching a glob pattern
    pub async fn shared_keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        self.shared.keys_matching(pattern).await.map_err(|err| {
            self.shared_errors.fetch_add(1, Ordering::Relaxed);
            err
        })
    }

    /// Remaining shared TTL of a key; absent and failed reads both `None`
    async fn shared_ttl_or_none(&self, key: &str) -> Option<Duration> {
        match self.shared.ttl_of(key).await {
            Ok(ttl) => ttl,
            Err(err) => {
                self.note_shared_error("ttl_of", key, &err);
                None
            }
        }
    }

    /// Snapshot of both tiers' counters
    pub async fn statistics(&self) -> TierStatistics {
        let (shared, shared_size) = match self.shared.approximate_size().await {
            Ok(size) => (self.shared.stats(), size),
            Err(err) => {
                warn!(error = %err, "shared tier stats unavailable");
                self.shared_errors.fetch_add(1, Ordering::Relaxed);
                (SharedBackendStats::default(), 0)
            }
        };
        TierStatistics {
            local_hits: self.local.hits(),
            local_misses: self.local.misses(),
            local_evictions: self.local.evictions(),
            local_size: self.local.len() as u64,
            shared,
            shared_size,
            shared_errors: self.shared_errors.load(Ordering::Relaxed),
        }
    }

    /// Number of shared-tier operations that failed or were degraded
    pub fn shared_error_count(&self) -> u64 {
        self.shared_errors.load(Ordering::Relaxed)
    }

    /// The local tier (sweeper and warming need direct access)
    pub fn local(&self) -> &LocalTier {
        &self.local
    }

    /// The shared backend
    pub fn shared(&self) -> &Arc<dyn SharedBackend> {
        &self.shared
    }

    fn note_shared_error(&self, op: &str, key: &str, err: &Error) {
        self.shared_errors.fetch_add(1, Ordering::Relaxed);
        warn!(op, key, error = %err, "shared tier degraded");
    }
}

// =============================================================================
// Tests
// =============================================================================
