//! StrataCache Integration Tests
//!
//! End-to-end scenarios across the public surface:
//! - Tiered lookup, write-through, and write-back
//! - Call-signature key derivation and the caching decorator
//! - Entity invalidation cascades
//! - Statistics, hot-key detection, warming, and sweeping

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use stratacache::{
    CacheEngine, CacheEngineConfig, CacheKeyable, InMemorySharedBackend, Lookup, SharedBackend,
    Tier,
};

static TRACING: Once = Once::new();

/// Route engine tracing through the test harness, once per process
fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

fn engine() -> CacheEngine {
    init_tracing();
    CacheEngine::in_memory(CacheEngineConfig {
        namespace: "bss".to_string(),
        warming_enabled: false,
        ..Default::default()
    })
    .unwrap()
}

// =============================================================================
// Tiered store behavior
// =============================================================================

mod tier_tests {
    use super::*;

    #[tokio::test]
    async fn test_write_through_and_tier_fallback() {
        init_tracing();
        let shared = Arc::new(InMemorySharedBackend::new());
        let engine = CacheEngine::new(
            CacheEngineConfig {
                warming_enabled: false,
                ..Default::default()
            },
            Arc::clone(&shared) as Arc<dyn SharedBackend>,
        )
        .unwrap();

        engine.put_cached("order:1", &"payload", None).await.unwrap();

        // Write-through reached the shared tier
        assert!(shared.get("order:1").await.unwrap().is_some());

        // First read is local; after local eviction the shared tier serves
        // it and repopulates L1
        assert!(matches!(
            engine.store().lookup("order:1").await,
            Lookup::Hit {
                tier: Tier::Local,
                ..
            }
        ));
        engine.store().local().remove("order:1");
        assert!(matches!(
            engine.store().lookup("order:1").await,
            Lookup::Hit {
                tier: Tier::Shared,
                ..
            }
        ));
        assert!(engine.store().local().contains("order:1"));
    }

    #[tokio::test]
    async fn test_ttl_is_shared_tier_authoritative() {
        let engine = engine();
        engine
            .put_cached("k", &1u64, Some(Duration::from_secs(120)))
            .await
            .unwrap();

        let ttl = engine.get_ttl("k").await.unwrap();
        assert!(ttl > Duration::from_secs(100) && ttl <= Duration::from_secs(120));

        // Extension lengthens, never shortens
        assert!(!engine.extend_ttl("k", Duration::from_secs(10)).await.unwrap());
        assert!(engine.extend_ttl("k", Duration::from_secs(600)).await.unwrap());
        assert!(engine.get_ttl("k").await.unwrap() > Duration::from_secs(500));
    }
}

// =============================================================================
// Key derivation and the caching decorator
// =============================================================================

mod decorator_tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Invoice {
        id: String,
        total_cents: u64,
    }

    #[tokio::test]
    async fn test_same_signature_same_key() {
        let engine = engine();
        let codec = engine.key_codec();
        let a = codec.generate_key(
            "InvoiceService",
            "findById",
            &["inv-1".to_key_arg()],
        );
        let b = codec.generate_key(
            "InvoiceService",
            "findById",
            &["inv-1".to_key_arg()],
        );
        let c = codec.generate_key(
            "InvoiceService",
            "findById",
            &["inv-2".to_key_arg()],
        );
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("bss:InvoiceService:findById:"));
    }

    #[tokio::test]
    async fn test_decorator_caches_and_coalesces() {
        let engine = Arc::new(engine());
        let loads = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            let loads = Arc::clone(&loads);
            handles.push(tokio::spawn(async move {
                engine
                    .cached::<Invoice, _, _>(
                        "InvoiceService",
                        "findById",
                        vec![Ok("inv-1".to_key_arg())],
                        None,
                        || async move {
                            loads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            Ok(Invoice {
                                id: "inv-1".into(),
                                total_cents: 12_500,
                            })
                        },
                    )
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().id, "inv-1");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loader_error_leaves_cache_empty() {
        let engine = engine();
        let result: stratacache::Result<Invoice> = engine
            .cached(
                "InvoiceService",
                "findById",
                vec![Ok("inv-x".to_key_arg())],
                None,
                || async { Err(stratacache::Error::Internal("upstream down".into())) },
            )
            .await;
        assert!(result.is_err());

        // Next call loads again
        let loaded: Invoice = engine
            .cached(
                "InvoiceService",
                "findById",
                vec![Ok("inv-x".to_key_arg())],
                None,
                || async {
                    Ok(Invoice {
                        id: "inv-x".into(),
                        total_cents: 1,
                    })
                },
            )
            .await
            .unwrap();
        assert_eq!(loaded.total_cents, 1);
    }
}

// =============================================================================
// Invalidation cascades
// =============================================================================

mod invalidation_tests {
    use super::*;

    #[tokio::test]
    async fn test_entity_cascade() {
        let engine = engine();
        for key in [
            "customer:42",
            "customer:list:active",
            "customer:aggregate:count:region",
            "customer:77",
        ] {
            engine.put_cached(key, &"v", None).await.unwrap();
        }
        let dependent = engine.key_codec().generate_key(
            "OrderService",
            "findByCustomer",
            &["42".to_key_arg()],
        );
        engine.put_cached(&dependent, &"orders", None).await.unwrap();
        engine.register_dependency("customer", "42", &dependent);

        engine.invalidate_entity("customer", "42").await.unwrap();

        assert!(!engine.has_key("customer:42").await);
        assert!(!engine.has_key(&dependent).await);
        assert!(!engine.has_key("customer:list:active").await);
        assert!(!engine.has_key("customer:aggregate:count:region").await);
        assert!(engine.has_key("customer:77").await);
    }

    #[tokio::test]
    async fn test_operation_pattern_eviction() {
        let engine = engine();
        for id in ["a", "b", "c"] {
            let key = engine
                .key_codec()
                .generate_key("ReportService", "daily", &[id.to_key_arg()]);
            engine.put_cached(&key, &"report", None).await.unwrap();
        }
        let other = engine
            .key_codec()
            .generate_key("ReportService", "monthly", &["a".to_key_arg()]);
        engine.put_cached(&other, &"report", None).await.unwrap();

        let removed = engine.evict_operation("ReportService", "daily").await.unwrap();
        assert_eq!(removed, 3);
        assert!(engine.has_key(&other).await);
    }
}

// =============================================================================
// Observability: statistics, hot keys, warming, sweeping
// =============================================================================

mod observability_tests {
    use super::*;

    #[tokio::test]
    async fn test_statistics_reflect_traffic() {
        let engine = engine();
        engine.put_cached("k", &1u64, None).await.unwrap();
        for _ in 0..9 {
            let _: Option<u64> = engine.get_cached("k").await.unwrap();
        }
        let _: Option<u64> = engine.get_cached("missing").await.unwrap();

        let stats = engine.statistics().await;
        assert_eq!(stats.performance.total_hits, 9);
        assert_eq!(stats.performance.total_misses, 1);
        assert_eq!(stats.performance.hit_rate, 90.0);
        assert!(engine.efficiency_score() > 0.0);
    }

    #[tokio::test]
    async fn test_hot_key_detection_through_engine() {
        let engine = engine();
        engine.put_cached("hot", &1u64, None).await.unwrap();
        for _ in 0..25 {
            let _: Option<u64> = engine.get_cached("hot").await.unwrap();
        }

        engine.hot_keys().detect_hot_keys();
        assert!(engine.hot_keys().is_hot_key("hot"));
        let stats = engine.statistics().await;
        assert!(stats.hot_key_count >= 1);
    }

    #[tokio::test]
    async fn test_warming_refreshes_hot_keys_into_local_tier() {
        init_tracing();
        let engine = CacheEngine::in_memory(CacheEngineConfig {
            hot_key_threshold: 3,
            warming_enabled: true,
            warming_interval: Duration::from_millis(20),
            ..Default::default()
        })
        .unwrap();

        // Seed the shared tier only, then make the key hot
        engine
            .store()
            .shared()
            .put("hot:k", Bytes::from_static(b"v"), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        for _ in 0..5 {
            engine.hot_keys().record_access("hot:k");
        }

        engine.warming().warm_all().await;
        assert!(engine.store().local().contains("hot:k"));
        assert!(engine.statistics().await.warming.keys_refreshed >= 1);
    }

    #[tokio::test]
    async fn test_sweeper_removes_near_expiry_entries() {
        let engine = engine();
        engine
            .put_cached("soon", &1u64, Some(Duration::from_secs(20)))
            .await
            .unwrap();
        engine
            .put_cached("later", &1u64, Some(Duration::from_secs(3600)))
            .await
            .unwrap();

        engine
            .sweeper()
            .configure(stratacache::SweepConfig {
                base_probability: 1.0,
                ..Default::default()
            })
            .unwrap();
        engine.sweeper().trigger_expiration_check().await;

        assert!(!engine.has_key("soon").await);
        assert!(engine.has_key("later").await);
        assert!(engine.statistics().await.sweeper.keys_expired >= 1);
    }

    #[tokio::test]
    async fn test_background_lifecycle() {
        init_tracing();
        let engine = CacheEngine::in_memory(CacheEngineConfig {
            warming_enabled: true,
            warming_interval: Duration::from_millis(20),
            sweep_interval: Duration::from_millis(20),
            ..Default::default()
        })
        .unwrap();

        engine.start();
        engine.put_cached("k", &1u64, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        engine.shutdown().await;

        let stats = engine.statistics().await;
        assert!(stats.warming.passes >= 1);
        assert!(stats.sweeper.passes >= 1);
    }
}
