//! Cache Engine
//!
//! The composition root: wires the key codec, tiered store, statistics
//! recorder, hot-key detector, invalidation coordinator, warming
//! scheduler, and expiration sweeper into one typed facade. Values
//! cross the tier boundary as JSON; callers work with their own
//! serde types.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::CacheEngineConfig;
use crate::error::Result;
use crate::hotkey::HotKeyDetector;
use crate::invalidation::{InvalidationCoordinator, InvalidationStatistics};
use crate::key::{KeyArg, KeyCodec};
use crate::local::LocalTierConfig;
use crate::shared::{InMemorySharedBackend, SharedBackend};
use crate::stats::{CachePerformanceStatistics, StatisticsRecorder};
use crate::store::{TierStatistics, TieredStore};
use crate::sweeper::{ExpirationSweeper, SweepConfig, SweeperStatistics};
use crate::warming::{WarmingScheduler, WarmingStatistics};

/// One snapshot across every engine component
#[derive(Debug, Clone)]
pub struct EngineStatistics {
    /// Per-key access statistics and hit rates
    pub performance: CachePerformanceStatistics,
    /// Tier-level counters
    pub tiers: TierStatistics,
    /// Invalidation activity
    pub invalidation: InvalidationStatistics,
    /// Warming activity
    pub warming: WarmingStatistics,
    /// Sweeper activity
    pub sweeper: SweeperStatistics,
    /// Keys in the monotonic hot set
    pub hot_key_count: u64,
}

/// Multi-tier cache engine
pub struct CacheEngine {
    config: CacheEngineConfig,
    codec: Arc<KeyCodec>,
    store: Arc<TieredStore>,
    recorder: Arc<StatisticsRecorder>,
    hot_keys: Arc<HotKeyDetector>,
    invalidation: Arc<InvalidationCoordinator>,
    warming: Arc<WarmingScheduler>,
    sweeper: Arc<ExpirationSweeper>,
}

impl CacheEngine {
    /// Build an engine over the given shared backend
    pub fn new(config: CacheEngineConfig, shared: Arc<dyn SharedBackend>) -> Result<Self> {
        config.validate()?;

        let codec = Arc::new(KeyCodec::new(config.namespace.clone()));
        let recorder = Arc::new(StatisticsRecorder::new());
        let hot_keys = Arc::new(HotKeyDetector::new(
            config.hot_key_threshold,
            config.hot_key_window,
        ));
        let store = Arc::new(TieredStore::new(
            LocalTierConfig {
                max_entries: config.l1_max_size,
                ttl_write: config.l1_ttl_write,
                ttl_access: config.l1_ttl_access,
            },
            shared,
            Arc::clone(&recorder),
            Arc::clone(&hot_keys),
            config.default_ttl,
        ));
        let invalidation = Arc::new(InvalidationCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&codec),
        ));
        let warming = Arc::new(WarmingScheduler::new(
            Arc::clone(&store),
            Arc::clone(&hot_keys),
            config.warming_enabled,
            config.warming_interval,
            config.warming_task_timeout,
            config.warming_stop_grace,
        ));
        let sweeper = Arc::new(ExpirationSweeper::new(
            Arc::clone(&store),
            Arc::clone(&hot_keys),
            SweepConfig {
                interval: config.sweep_interval,
                base_probability: config.sweep_base_probability,
                hot_key_reduction_factor: config.sweep_hot_key_reduction_factor,
                max_entries_per_pass: config.sweep_max_entries_per_pass,
            },
        )?);

        info!(namespace = %config.namespace, "cache engine initialized");
        Ok(Self {
            config,
            codec,
            store,
            recorder,
            hot_keys,
            invalidation,
            warming,
            sweeper,
        })
    }

    /// Build an engine over the in-memory shared backend
    pub fn in_memory(config: CacheEngineConfig) -> Result<Self> {
        Self::new(config, Arc::new(InMemorySharedBackend::new()))
    }

    /// Start the warming and sweeping background loops
    pub fn start(&self) {
        Arc::clone(&self.warming).start();
        Arc::clone(&self.sweeper).start();
    }

    /// Stop the background loops; waits out the warming grace period
    pub async fn shutdown(&self) {
        self.warming.stop().await;
        self.sweeper.stop();
        info!("cache engine shut down");
    }

    // -------------------------------------------------------------------------
    // Typed value access
    // -------------------------------------------------------------------------

    /// Get and decode a cached value
    pub async fn get_cached<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and cache a value; `None` TTL uses the engine default
    pub async fn put_cached<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let encoded = serde_json::to_vec(value)?;
        self.store.put(key, Bytes::from(encoded), ttl).await
    }

    /// Cache a call signature's result, loading it on a miss
    ///
    /// The key is derived from `class`, `operation`, and the
    /// canonicalized arguments. Concurrent callers for the same key
    /// coalesce onto one loader invocation.
    #[instrument(skip(self, args, loader))]
    pub async fn cached<T, F, Fut>(
        &self,
        class: &str,
        operation: &str,
        args: Vec<Result<KeyArg>>,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = self.codec.generate_key_checked(class, operation, args);
        let bytes = self
            .store
            .get_or_load(&key, ttl, || async move {
                let value = loader().await?;
                Ok(Bytes::from(serde_json::to_vec(&value)?))
            })
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // -------------------------------------------------------------------------
    // Direct store operations
    // -------------------------------------------------------------------------

    /// Remove a key from both tiers
    pub async fn evict(&self, key: &str) -> Result<bool> {
        self.invalidation.invalidate(key).await
    }

    /// Remove every key matching a glob pattern
    pub async fn evict_pattern(&self, pattern: &str) -> Result<u64> {
        self.invalidation.invalidate_pattern(pattern).await
    }

    /// Remove every cached result of one operation
    pub async fn evict_operation(&self, class: &str, operation: &str) -> Result<u64> {
        let pattern = self.codec.generate_pattern(class, operation);
        self.invalidation.invalidate_pattern(&pattern).await
    }

    /// Cascade-invalidate an entity and everything derived from it
    #[instrument(skip(self))]
    pub async fn invalidate_entity(&self, entity_type: &str, id: &str) -> Result<u64> {
        self.invalidation.invalidate_entity(entity_type, id).await
    }

    /// Run a mutating operation, then cascade-invalidate the entity it
    /// touched
    ///
    /// The cascade only fires when the operation succeeds; a failed
    /// operation leaves the cache as it was.
    pub async fn invalidate_entity_after<T, F, Fut>(
        &self,
        entity_type: &str,
        id: &str,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = operation().await?;
        self.invalidation.invalidate_entity(entity_type, id).await?;
        Ok(result)
    }

    /// Register a cache key as depending on an entity
    pub fn register_dependency(&self, entity_type: &str, id: &str, dependent_key: &str) {
        self.invalidation
            .register_dependency(entity_type, id, dependent_key);
    }

    /// Drop everything from both tiers
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Whether a live entry exists in either tier
    pub async fn has_key(&self, key: &str) -> bool {
        self.store.has_key(key).await
    }

    /// Remaining shared-tier TTL of a key
    pub async fn get_ttl(&self, key: &str) -> Option<Duration> {
        self.store.get_ttl(key).await
    }

    /// Lengthen a key's TTL; never shortens
    pub async fn extend_ttl(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.store.extend_ttl(key, ttl).await
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Snapshot every component's counters
    pub async fn statistics(&self) -> EngineStatistics {
        EngineStatistics {
            performance: self.recorder.statistics(),
            tiers: self.store.statistics().await,
            invalidation: self.invalidation.statistics(),
            warming: self.warming.statistics(),
            sweeper: self.sweeper.statistics(),
            hot_key_count: self.hot_keys.hot_key_count() as u64,
        }
    }

    /// Overall cache efficiency, 0 to 100
    pub fn efficiency_score(&self) -> f64 {
        self.recorder.efficiency_score()
    }

    /// Whether the cache is performing acceptably
    pub fn is_healthy(&self) -> bool {
        self.recorder.is_healthy()
    }

    /// The engine configuration
    pub fn config(&self) -> &CacheEngineConfig {
        &self.config
    }

    /// The key codec for this engine's namespace
    pub fn key_codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// The tiered store
    pub fn store(&self) -> &Arc<TieredStore> {
        &self.store
    }

    /// The warming scheduler (for registering warming routines)
    pub fn warming(&self) -> &Arc<WarmingScheduler> {
        &self.warming
    }

    /// The expiration sweeper
    pub fn sweeper(&self) -> &Arc<ExpirationSweeper> {
        &self.sweeper
    }

    /// The invalidation coordinator
    pub fn invalidation(&self) -> &Arc<InvalidationCoordinator> {
        &self.invalidation
    }

    /// The hot-key detector
    pub fn hot_keys(&self) -> &Arc<HotKeyDetector> {
        &self.hot_keys
    }
}

// =============================================================================
// Tests
// =============================================================================
