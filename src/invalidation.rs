//! Invalidation Coordinator
//!
//! Entity-centric eviction: callers register cache keys as dependents
//! of an entity, and invalidating that entity cascades to its own key,
//! every registered dependent, and the entity type's list/aggregate
//! key families. A short recency ledger answers "was this key just
//! invalidated", which loaders use to skip caching stale reads.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::key::KeyCodec;
use crate::store::TieredStore;

/// Pruning horizon for the recency ledger; lookups use their own window
const RECENCY_WINDOW: Duration = Duration::from_secs(60);

/// Counters for invalidation activity
#[derive(Debug, Clone, Default)]
pub struct InvalidationStatistics {
    /// Single-key invalidations
    pub key_invalidations: u64,
    /// Pattern invalidations issued
    pub pattern_invalidations: u64,
    /// Entity cascades issued
    pub entity_invalidations: u64,
    /// Entities with registered dependents
    pub tracked_entities: u64,
    /// Total registered dependent keys
    pub tracked_dependents: u64,
}

/// Coordinates dependency-aware cache invalidation
pub struct InvalidationCoordinator {
    store: Arc<TieredStore>,
    codec: Arc<KeyCodec>,
    dependents: DashMap<String, HashSet<String>>,
    recent: DashMap<String, Instant>,
    key_invalidations: AtomicU64,
    pattern_invalidations: AtomicU64,
    entity_invalidations: AtomicU64,
}

impl InvalidationCoordinator {
    /// Create a coordinator over the given store
    pub fn new(store: Arc<TieredStore>, codec: Arc<KeyCodec>) -> Self {
        Self {
            store,
            codec,
            dependents: DashMap::new(),
            recent: DashMap::new(),
            key_invalidations: AtomicU64::new(0),
            pattern_invalidations: AtomicU64::new(0),
            entity_invalidations: AtomicU64::new(0),
        }
    }

    /// Register a cache key as depending on an entity
    ///
    /// The key will be evicted whenever that entity is invalidated.
    pub fn register_dependency(&self, entity_type: &str, id: &str, dependent_key: &str) {
        let entity_key = self.codec.generate_entity_key(entity_type, id);
        self.dependents
            .entry(entity_key)
            .or_default()
            .insert(dependent_key.to_string());
    }

    /// Keys currently registered as dependents of an entity
    pub fn dependents_of(&self, entity_type: &str, id: &str) -> Vec<String> {
        let entity_key = self.codec.generate_entity_key(entity_type, id);
        self.dependents
            .get(&entity_key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Invalidate a single key
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let removed = self.store.evict(key).await?;
        self.mark_recent(key);
        self.key_invalidations.fetch_add(1, Ordering::Relaxed);
        Ok(removed)
    }

    /// Invalidate every key matching a glob pattern
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let removed = self.store.evict_pattern(pattern).await?;
        self.pattern_invalidations.fetch_add(1, Ordering::Relaxed);
        debug!(pattern, removed, "pattern invalidation");
        Ok(removed)
    }

    /// Invalidate a batch of keys, returning how many existed
    pub async fn batch_invalidate<I, K>(&self, keys: I) -> Result<u64>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut removed = 0u64;
        for key in keys {
            if self.invalidate(key.as_ref()).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Cascade-invalidate an entity
    ///
    /// Evicts the entity's own key, every registered dependent, and the
    /// type's `list` and `aggregate` key families. Registrations are
    /// consulted, not consumed: a later cascade for the same entity
    /// evicts the same dependents again. Returns the number of keys
    /// evicted directly (pattern families not counted individually).
    pub async fn invalidate_entity(&self, entity_type: &str, id: &str) -> Result<u64> {
        let entity_key = self.codec.generate_entity_key(entity_type, id);
        let mut removed = 0u64;

        if self.store.evict(&entity_key).await? {
            removed += 1;
        }
        self.mark_recent(&entity_key);

        let dependents: HashSet<String> = self
            .dependents
            .get(&entity_key)
            .map(|set| set.value().clone())
            .unwrap_or_default();
        for key in &dependents {
            if self.store.evict(key).await? {
                removed += 1;
            }
            self.mark_recent(key);
        }

        // Collection and aggregate views of the type are always stale
        // after any entity change
        let list_removed = self
            .store
            .evict_pattern(&format!("{}:list:*", entity_type))
            .await?;
        let aggregate_removed = self
            .store
            .evict_pattern(&format!("{}:aggregate:*", entity_type))
            .await?;

        self.entity_invalidations.fetch_add(1, Ordering::Relaxed);
        info!(
            entity = %entity_key,
            dependents = dependents.len(),
            removed,
            list_removed,
            aggregate_removed,
            "entity invalidation cascade"
        );
        Ok(removed)
    }

    /// Whether a key was invalidated within the last `window`
    pub fn was_recently_invalidated(&self, key: &str, window: Duration) -> bool {
        let elapsed = match self.recent.get(key) {
            Some(at) => at.elapsed(),
            None => return false,
        };
        if elapsed > RECENCY_WINDOW {
            self.recent.remove(key);
        }
        elapsed <= window
    }

    /// Invalidation counters and registry size
    pub fn statistics(&self) -> InvalidationStatistics {
        InvalidationStatistics {
            key_invalidations: self.key_invalidations.load(Ordering::Relaxed),
            pattern_invalidations: self.pattern_invalidations.load(Ordering::Relaxed),
            entity_invalidations: self.entity_invalidations.load(Ordering::Relaxed),
            tracked_entities: self.dependents.len() as u64,
            tracked_dependents: self
                .dependents
                .iter()
                .map(|e| e.value().len() as u64)
                .sum(),
        }
    }

    fn mark_recent(&self, key: &str) {
        self.recent.insert(key.to_string(), Instant::now());
        // Keep the ledger from growing without bound
        if self.recent.len() > 10_000 {
            self.recent.retain(|_, at| at.elapsed() <= RECENCY_WINDOW);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::HotKeyDetector;
    use crate::local::LocalTierConfig;
    use crate::shared::InMemorySharedBackend;
    use crate::stats::StatisticsRecorder;
    use bytes::Bytes;

    fn fixture() -> (Arc<TieredStore>, InvalidationCoordinator) {
        let store = Arc::new(TieredStore::new(
            LocalTierConfig::default(),
            Arc::new(InMemorySharedBackend::new()),
            Arc::new(StatisticsRecorder::new()),
            Arc::new(HotKeyDetector::default()),
            Duration::from_secs(1800),
        ));
        let codec = Arc::new(KeyCodec::new("app"));
        let coordinator = InvalidationCoordinator::new(Arc::clone(&store), codec);
        (store, coordinator)
    }

    #[tokio::test]
    async fn test_invalidate_single_key() {
        let (store, coordinator) = fixture();
        store
            .put("order:1", Bytes::from_static(b"v"), None)
            .await
            .unwrap();

        assert!(coordinator.invalidate("order:1").await.unwrap());
        assert!(store.get("order:1").await.is_none());
        assert!(!coordinator.invalidate("order:1").await.unwrap());
        assert_eq!(coordinator.statistics().key_invalidations, 2);
    }

    #[tokio::test]
    async fn test_entity_cascade_hits_dependents_and_families() {
        let (store, coordinator) = fixture();
        for key in [
            "customer:42",
            "customer:list:active",
            "customer:aggregate:count:all",
            "app:OrderService:findByCustomer:abc123",
            "customer:7",
        ] {
            store
                .put(key, Bytes::from_static(b"v"), None)
                .await
                .unwrap();
        }
        coordinator.register_dependency(
            "customer",
            "42",
            "app:OrderService:findByCustomer:abc123",
        );

        coordinator.invalidate_entity("customer", "42").await.unwrap();

        assert!(store.get("customer:42").await.is_none());
        assert!(store
            .get("app:OrderService:findByCustomer:abc123")
            .await
            .is_none());
        assert!(store.get("customer:list:active").await.is_none());
        assert!(store.get("customer:aggregate:count:all").await.is_none());
        // Unrelated entity of the same type survives
        assert!(store.get("customer:7").await.is_some());
    }

    #[tokio::test]
    async fn test_registrations_survive_cascade() {
        let (store, coordinator) = fixture();
        coordinator.register_dependency("customer", "42", "order:list:cust-42");
        assert_eq!(coordinator.dependents_of("customer", "42").len(), 1);

        coordinator.invalidate_entity("customer", "42").await.unwrap();
        assert_eq!(coordinator.dependents_of("customer", "42").len(), 1);

        // A dependent cached again after the first cascade is evicted by
        // the next one
        store
            .put("order:list:cust-42", Bytes::from_static(b"v"), None)
            .await
            .unwrap();
        coordinator.invalidate_entity("customer", "42").await.unwrap();
        assert!(store.get("order:list:cust-42").await.is_none());
    }

    #[tokio::test]
    async fn test_pattern_invalidation() {
        let (store, coordinator) = fixture();
        store
            .put("report:daily:1", Bytes::from_static(b"1"), None)
            .await
            .unwrap();
        store
            .put("report:daily:2", Bytes::from_static(b"2"), None)
            .await
            .unwrap();

        let removed = coordinator.invalidate_pattern("report:daily:*").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(coordinator.statistics().pattern_invalidations, 1);
    }

    #[tokio::test]
    async fn test_batch_invalidate_counts_existing() {
        let (store, coordinator) = fixture();
        store.put("a", Bytes::from_static(b"1"), None).await.unwrap();
        store.put("b", Bytes::from_static(b"2"), None).await.unwrap();

        let removed = coordinator
            .batch_invalidate(["a", "b", "missing"])
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn test_recency_ledger() {
        let (store, coordinator) = fixture();
        store.put("k", Bytes::from_static(b"v"), None).await.unwrap();

        let window = Duration::from_secs(60);
        assert!(!coordinator.was_recently_invalidated("k", window));
        coordinator.invalidate("k").await.unwrap();
        assert!(coordinator.was_recently_invalidated("k", window));
        assert!(!coordinator.was_recently_invalidated("other", window));
        // A zero window sees nothing as recent
        assert!(!coordinator.was_recently_invalidated("k", Duration::ZERO));
    }

    #[tokio::test]
    async fn test_statistics_track_registry() {
        let (_store, coordinator) = fixture();
        coordinator.register_dependency("customer", "1", "dep:a");
        coordinator.register_dependency("customer", "1", "dep:b");
        coordinator.register_dependency("order", "9", "dep:c");

        let stats = coordinator.statistics();
        assert_eq!(stats.tracked_entities, 2);
        assert_eq!(stats.tracked_dependents, 3);
    }
}
