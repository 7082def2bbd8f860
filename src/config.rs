//! Cache Engine Configuration
//!
//! All tunables for the tiers, hot-key detection, warming, and the
//! adaptive expiration sweep. Invalid values fail fast at construction.

use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for the whole cache engine
#[derive(Debug, Clone)]
pub struct CacheEngineConfig {
    /// Key namespace prefixed onto every derived call-signature key
    pub namespace: String,
    /// Maximum number of entries held in the local tier
    pub l1_max_size: usize,
    /// Local tier expire-after-write
    pub l1_ttl_write: Duration,
    /// Local tier expire-after-access
    pub l1_ttl_access: Duration,
    /// Default TTL applied when a put does not specify one
    pub default_ttl: Duration,
    /// Access count at which a key becomes hot
    pub hot_key_threshold: u64,
    /// Rolling window after which live hot-key counters are cleared
    /// (`None` disables rolling; the monotonic hot set is never rolled)
    pub hot_key_window: Option<Duration>,
    /// Whether the warming scheduler runs at all
    pub warming_enabled: bool,
    /// Delay between warming passes
    pub warming_interval: Duration,
    /// Per-routine timeout inside a warming pass
    pub warming_task_timeout: Duration,
    /// Grace period stop_warming waits for an in-flight pass
    pub warming_stop_grace: Duration,
    /// Delay between sweeper passes
    pub sweep_interval: Duration,
    /// Starting eviction probability for a sampled entry
    pub sweep_base_probability: f64,
    /// Multiplier applied to the probability for hot keys
    pub sweep_hot_key_reduction_factor: f64,
    /// Maximum keys sampled per sweeper pass
    pub sweep_max_entries_per_pass: usize,
}

impl Default for CacheEngineConfig {
    fn default() -> Self {
        Self {
            namespace: "app".to_string(),
            l1_max_size: 1000,
            l1_ttl_write: Duration::from_secs(600),
            l1_ttl_access: Duration::from_secs(300),
            default_ttl: Duration::from_secs(1800),
            hot_key_threshold: 20,
            hot_key_window: Some(Duration::from_secs(3600)),
            warming_enabled: true,
            warming_interval: Duration::from_secs(600),
            warming_task_timeout: Duration::from_secs(30),
            warming_stop_grace: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(30),
            sweep_base_probability: 0.10,
            sweep_hot_key_reduction_factor: 0.5,
            sweep_max_entries_per_pass: 1000,
        }
    }
}

impl CacheEngineConfig {
    /// Validate the configuration, failing fast on invalid values
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::Config("namespace must not be empty".into()));
        }
        if self.l1_max_size == 0 {
            return Err(Error::Config("l1_max_size must be > 0".into()));
        }
        if self.l1_ttl_write.is_zero() || self.l1_ttl_access.is_zero() {
            return Err(Error::Config("local tier TTLs must be > 0".into()));
        }
        if self.default_ttl.is_zero() {
            return Err(Error::Config("default_ttl must be > 0".into()));
        }
        if self.hot_key_threshold == 0 {
            return Err(Error::Config("hot_key_threshold must be > 0".into()));
        }
        if let Some(window) = self.hot_key_window {
            if window.is_zero() {
                return Err(Error::Config("hot_key_window must be > 0".into()));
            }
        }
        if self.warming_interval.is_zero() {
            return Err(Error::Config("warming_interval must be > 0".into()));
        }
        if self.warming_task_timeout.is_zero() {
            return Err(Error::Config("warming_task_timeout must be > 0".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Config("sweep_interval must be > 0".into()));
        }
        validate_probability("sweep_base_probability", self.sweep_base_probability)?;
        validate_probability(
            "sweep_hot_key_reduction_factor",
            self.sweep_hot_key_reduction_factor,
        )?;
        if self.sweep_max_entries_per_pass == 0 {
            return Err(Error::Config(
                "sweep_max_entries_per_pass must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn validate_probability(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        return Err(Error::Config(format!(
            "{} must lie in (0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
