//! Adaptive Expiration Sweeper
//!
//! Proactively removes entries close to their shared-tier expiry so
//! misses land before the rush instead of during it. Eviction is
//! probabilistic per sampled key: hot keys are swept more reluctantly,
//! keys about to expire more eagerly, long-lived keys barely at all.
//! Only near-expiry entries are ever removed here (no recorded TTL, or
//! under a minute remaining); everything else is left to ordinary TTL
//! handling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::hotkey::HotKeyDetector;
use crate::store::TieredStore;

/// Only entries expiring within this horizon are eviction candidates
const NEAR_EXPIRY: Duration = Duration::from_secs(60);
/// TTLs below this sweep more aggressively
const SHORT_TTL: Duration = Duration::from_secs(300);
/// TTLs above this sweep more conservatively
const LONG_TTL: Duration = Duration::from_secs(1800);
const SHORT_TTL_FACTOR: f64 = 1.5;
const LONG_TTL_FACTOR: f64 = 0.5;

/// Sweeper tunables, adjustable at runtime
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Delay between passes
    pub interval: Duration,
    /// Starting eviction probability per sampled key
    pub base_probability: f64,
    /// Probability multiplier for hot keys
    pub hot_key_reduction_factor: f64,
    /// Maximum keys sampled per pass
    pub max_entries_per_pass: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            base_probability: 0.10,
            hot_key_reduction_factor: 0.5,
            max_entries_per_pass: 1000,
        }
    }
}

impl SweepConfig {
    fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Config("sweep interval must be > 0".into()));
        }
        for (name, value) in [
            ("base_probability", self.base_probability),
            ("hot_key_reduction_factor", self.hot_key_reduction_factor),
        ] {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(Error::Config(format!(
                    "{} must lie in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.max_entries_per_pass == 0 {
            return Err(Error::Config("max_entries_per_pass must be > 0".into()));
        }
        Ok(())
    }
}

/// Sweeper activity counters
#[derive(Debug, Clone, Default)]
pub struct SweeperStatistics {
    /// Completed passes
    pub passes: u64,
    /// Keys sampled across all passes
    pub keys_checked: u64,
    /// Keys proactively evicted
    pub keys_expired: u64,
}

/// Background sweeper over the shared tier
pub struct ExpirationSweeper {
    store: Arc<TieredStore>,
    hot_keys: Arc<HotKeyDetector>,
    config: Mutex<SweepConfig>,
    rng: Mutex<StdRng>,
    cancel: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    passes: AtomicU64,
    keys_checked: AtomicU64,
    keys_expired: AtomicU64,
}

impl ExpirationSweeper {
    /// Create a sweeper with an entropy-seeded RNG
    pub fn new(
        store: Arc<TieredStore>,
        hot_keys: Arc<HotKeyDetector>,
        config: SweepConfig,
    ) -> Result<Self> {
        Self::with_rng(store, hot_keys, config, StdRng::from_entropy())
    }

    /// Create a sweeper with a fixed RNG seed (deterministic sweeps)
    pub fn with_seed(
        store: Arc<TieredStore>,
        hot_keys: Arc<HotKeyDetector>,
        config: SweepConfig,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(store, hot_keys, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        store: Arc<TieredStore>,
        hot_keys: Arc<HotKeyDetector>,
        config: SweepConfig,
        rng: StdRng,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            hot_keys,
            config: Mutex::new(config),
            rng: Mutex::new(rng),
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
            passes: AtomicU64::new(0),
            keys_checked: AtomicU64::new(0),
            keys_expired: AtomicU64::new(0),
        })
    }

    /// Start the background sweep loop; no-op when already running
    pub fn start(self: Arc<Self>) {
        let mut cancel_slot = self.cancel.lock();
        if cancel_slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *cancel_slot = Some(token.clone());
        drop(cancel_slot);

        let sweeper = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            info!("expiration sweeper started");
            loop {
                let delay = sweeper.config.lock().interval;
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => sweeper.run_pass().await,
                }
            }
            info!("expiration sweeper stopped");
        });
        *self.handle.lock() = Some(handle);
    }

    /// Stop the sweep loop without waiting for an in-flight pass
    pub fn stop(&self) {
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    /// Run one sweep pass right now
    pub async fn trigger_expiration_check(&self) {
        self.run_pass().await;
    }

    /// Replace the tunables; takes effect on the next pass
    pub fn configure(&self, config: SweepConfig) -> Result<()> {
        config.validate()?;
        *self.config.lock() = config;
        Ok(())
    }

    /// Current counters
    pub fn statistics(&self) -> SweeperStatistics {
        SweeperStatistics {
            passes: self.passes.load(Ordering::Relaxed),
            keys_checked: self.keys_checked.load(Ordering::Relaxed),
            keys_expired: self.keys_expired.load(Ordering::Relaxed),
        }
    }

    /// Zero the counters
    pub fn reset_statistics(&self) {
        self.passes.store(0, Ordering::Relaxed);
        self.keys_checked.store(0, Ordering::Relaxed);
        self.keys_expired.store(0, Ordering::Relaxed);
    }

    async fn run_pass(&self) {
        let config = self.config.lock().clone();
        let mut keys = match self.store.shared_keys_matching("*").await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "sweep pass skipped, shared tier unavailable");
                return;
            }
        };
        keys.truncate(config.max_entries_per_pass);

        let mut checked = 0u64;
        let mut expired = 0u64;
        for key in keys {
            checked += 1;
            let remaining = self.store.get_ttl(&key).await;

            let probability = self.eviction_probability(&config, &key, remaining);
            let draw: f64 = self.rng.lock().gen();
            // A missing TTL record counts as near-expiry: nothing else
            // will ever reclaim such an entry proactively
            let near_expiry = remaining.map_or(true, |r| r < NEAR_EXPIRY);
            if draw < probability && near_expiry {
                match self.store.evict(&key).await {
                    Ok(true) => expired += 1,
                    Ok(false) => {}
                    Err(err) => warn!(key, error = %err, "sweep eviction failed"),
                }
            }
        }

        self.passes.fetch_add(1, Ordering::Relaxed);
        self.keys_checked.fetch_add(checked, Ordering::Relaxed);
        self.keys_expired.fetch_add(expired, Ordering::Relaxed);
        debug!(checked, expired, "sweep pass complete");
    }

    fn eviction_probability(
        &self,
        config: &SweepConfig,
        key: &str,
        remaining: Option<Duration>,
    ) -> f64 {
        let mut probability = config.base_probability;
        if self.hot_keys.is_hot_key(key) {
            probability *= config.hot_key_reduction_factor;
        }
        match remaining {
            Some(r) if r < SHORT_TTL => probability *= SHORT_TTL_FACTOR,
            Some(r) if r > LONG_TTL => probability *= LONG_TTL_FACTOR,
            _ => {}
        }
        probability.min(1.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
