//! Warming Scheduler
//!
//! Periodically refreshes hot keys into the local tier and runs any
//! registered warming routines (common queries, precomputed
//! aggregates). Each routine runs under its own timeout and failures
//! are isolated: one broken routine never stops the pass or the
//! scheduler.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::hotkey::HotKeyDetector;
use crate::store::TieredStore;

/// A registered warming routine
pub type WarmingFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Counters describing warming activity
#[derive(Debug, Clone)]
pub struct WarmingStatistics {
    /// Completed warming passes
    pub passes: u64,
    /// Routine invocations that failed or timed out
    pub task_failures: u64,
    /// Hot keys refreshed into the local tier
    pub keys_refreshed: u64,
    /// Registered routines
    pub registered_tasks: u64,
    /// Whether the scheduler is currently enabled
    pub enabled: bool,
    /// Current pass interval
    pub interval: Duration,
}

/// Schedules periodic cache warming
pub struct WarmingScheduler {
    store: Arc<TieredStore>,
    hot_keys: Arc<HotKeyDetector>,
    tasks: DashMap<String, WarmingFn>,
    enabled: AtomicBool,
    interval: Mutex<Duration>,
    task_timeout: Duration,
    stop_grace: Duration,
    cancel: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    passes: AtomicU64,
    task_failures: AtomicU64,
    keys_refreshed: AtomicU64,
}

impl WarmingScheduler {
    /// Create a scheduler; call [`start`](Self::start) to run it
    pub fn new(
        store: Arc<TieredStore>,
        hot_keys: Arc<HotKeyDetector>,
        enabled: bool,
        interval: Duration,
        task_timeout: Duration,
        stop_grace: Duration,
    ) -> Self {
        Self {
            store,
            hot_keys,
            tasks: DashMap::new(),
            enabled: AtomicBool::new(enabled),
            interval: Mutex::new(interval),
            task_timeout,
            stop_grace,
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
            passes: AtomicU64::new(0),
            task_failures: AtomicU64::new(0),
            keys_refreshed: AtomicU64::new(0),
        }
    }

    /// Register a named warming routine, replacing any previous one
    pub fn register_task(&self, name: &str, task: WarmingFn) {
        self.tasks.insert(name.to_string(), task);
        debug!(name, "warming task registered");
    }

    /// Remove a warming routine
    pub fn unregister_task(&self, name: &str) -> bool {
        self.tasks.remove(name).is_some()
    }

    /// Start the background warming loop
    ///
    /// No-op when disabled or already running. The loop runs one pass
    /// immediately, then again after every interval.
    pub fn start(self: Arc<Self>) {
        if !self.enabled.load(Ordering::Relaxed) {
            info!("cache warming disabled, scheduler not started");
            return;
        }
        let mut cancel_slot = self.cancel.lock();
        if cancel_slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *cancel_slot = Some(token.clone());
        drop(cancel_slot);

        let scheduler = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            info!("warming scheduler started");
            loop {
                scheduler.run_pass().await;
                let delay = *scheduler.interval.lock();
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            info!("warming scheduler stopped");
        });
        *self.handle.lock() = Some(handle);
    }

    /// Stop the warming loop, waiting briefly for an in-flight pass
    ///
    /// After the grace period the loop task is aborted.
    pub async fn stop(&self) {
        let token = self.cancel.lock().take();
        if let Some(token) = token {
            token.cancel();
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.stop_grace, handle).await.is_err() {
                warn!("warming pass outlived stop grace period, aborting");
                abort.abort();
            }
        }
    }

    /// Run one warming pass right now
    pub async fn warm_all(&self) {
        self.run_pass().await;
    }

    /// Enable or disable future passes
    ///
    /// Disabling does not stop a running loop; it skips pass bodies
    /// until re-enabled.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        info!(enabled, "cache warming toggled");
    }

    /// Change the delay between passes; takes effect after the current
    /// pass
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::Config("warming interval must be > 0".into()));
        }
        *self.interval.lock() = interval;
        Ok(())
    }

    /// Current counters
    pub fn statistics(&self) -> WarmingStatistics {
        WarmingStatistics {
            passes: self.passes.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
            keys_refreshed: self.keys_refreshed.load(Ordering::Relaxed),
            registered_tasks: self.tasks.len() as u64,
            enabled: self.enabled.load(Ordering::Relaxed),
            interval: *self.interval.lock(),
        }
    }

    async fn run_pass(&self) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }

        self.refresh_hot_keys().await;

        let tasks: Vec<(String, WarmingFn)> = self
            .tasks
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        for (name, task) in tasks {
            match tokio::time::timeout(self.task_timeout, task()).await {
                Ok(Ok(())) => debug!(name, "warming task completed"),
                Ok(Err(err)) => {
                    self.task_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(name, error = %err, "warming task failed");
                }
                Err(_) => {
                    self.task_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(name, timeout = ?self.task_timeout, "warming task timed out");
                }
            }
        }

        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Pull every detected hot key back into the local tier
    async fn refresh_hot_keys(&self) {
        let hot = self.hot_keys.detect_hot_keys();
        let mut refreshed = 0u64;
        for key in &hot {
            if self.store.get(key).await.is_some() {
                refreshed += 1;
            }
        }
        if refreshed > 0 {
            self.keys_refreshed.fetch_add(refreshed, Ordering::Relaxed);
            debug!(refreshed, candidates = hot.len(), "hot keys refreshed");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
