//! StrataCache - Multi-Tier Cache Engine
//!
//! A two-tier cache for read-heavy services: a fast bounded in-process
//! tier (L1) in front of a larger shared tier (L2), with deterministic
//! key derivation, dependency-aware invalidation, hot-key detection,
//! scheduled warming, and adaptive probabilistic expiration.
//!
//! # Architecture
//!
//! ```text
//! CacheEngine → TieredStore → LocalTier (L1)
//!                           → SharedBackend (L2, pluggable)
//! ```
//!
//! Reads fall through L1 to L2 and repopulate L1 on the way back;
//! writes go through to both tiers. The shared tier is authoritative
//! for TTLs. Background loops keep hot keys warm and sweep entries
//! that are about to expire.
//!
//! # Example
//!
//! ```no_run
//! use stratacache::{CacheEngine, CacheEngineConfig, CacheKeyable};
//!
//! # async fn run() -> stratacache::Result<()> {
//! let engine = CacheEngine::in_memory(CacheEngineConfig::default())?;
//! engine.start();
//!
//! let total: u64 = engine
//!     .cached("OrderService", "totalFor", vec![Ok("cust-1".to_key_arg())], None, || async {
//!         Ok(42u64) // expensive load
//!     })
//!     .await?;
//!
//! engine.invalidate_entity("order", "ord-9").await?;
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`engine`] - Composition root and typed facade
//! - [`store`] - Two-tier read/write surface
//! - [`local`] - In-process tier (L1)
//! - [`shared`] - Shared tier backend trait and in-memory impl (L2)
//! - [`key`] - Deterministic cache key derivation
//! - [`invalidation`] - Dependency-aware cascade invalidation
//! - [`hotkey`] - Access counting and hot-key detection
//! - [`stats`] - Per-key and aggregate performance statistics
//! - [`warming`] - Scheduled cache warming
//! - [`sweeper`] - Adaptive probabilistic expiration
//! - [`pattern`] - Glob matching over cache keys
//! - [`entry`] - Stored entry with TTL and access metadata
//! - [`config`] - Engine configuration
//! - [`error`] - Error types

pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod hotkey;
pub mod invalidation;
pub mod key;
pub mod local;
pub mod pattern;
pub mod shared;
pub mod stats;
pub mod store;
pub mod sweeper;
pub mod warming;

// Re-export commonly used types
pub use config::CacheEngineConfig;
pub use engine::{CacheEngine, EngineStatistics};
pub use error::{Error, Result};
pub use hotkey::HotKeyDetector;
pub use invalidation::{InvalidationCoordinator, InvalidationStatistics};
pub use key::{CacheKeyable, KeyArg, KeyCodec};
pub use shared::{InMemorySharedBackend, SharedBackend, SharedBackendStats};
pub use stats::{CachePerformanceStatistics, StatisticsRecorder};
pub use store::{Lookup, Tier, TierStatistics, TieredStore};
pub use sweeper::{ExpirationSweeper, SweepConfig, SweeperStatistics};
pub use warming::{WarmingFn, WarmingScheduler, WarmingStatistics};
