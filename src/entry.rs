//! Cache Entry
//!
//! The unit of storage owned by the tiers: an opaque payload plus TTL
//! and access bookkeeping. Access timestamps use an atomic offset from
//! the creation instant so reads never take a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;

/// A cached value with expiry and access-tracking metadata
#[derive(Debug)]
pub struct CacheEntry {
    /// Opaque payload
    value: Bytes,
    /// When the entry was created (re-put replaces the entry wholesale)
    created_at: Instant,
    /// Hard expiry instant; `None` means no TTL
    expires_at: Option<Instant>,
    /// Milliseconds since `created_at` of the most recent access
    last_access_ms: AtomicU64,
}

impl CacheEntry {
    /// Create an entry, optionally bounded by a TTL
    pub fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: ttl.map(|t| now + t),
            last_access_ms: AtomicU64::new(0),
        }
    }

    /// The cached payload
    #[inline]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Payload size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.value.len()
    }

    /// Creation instant
    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Whether the hard TTL has elapsed
    #[inline]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Time left before hard expiry; `None` when the entry has no TTL
    ///
    /// Returns `Some(Duration::ZERO)` once the deadline has passed.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Replace the expiry deadline
    pub fn set_expiry(&mut self, ttl: Option<Duration>) {
        self.expires_at = ttl.map(|t| Instant::now() + t);
    }

    /// Record an access, refreshing the last-accessed timestamp
    #[inline]
    pub fn touch(&self) {
        let elapsed = self.created_at.elapsed().as_millis() as u64;
        self.last_access_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Instant of the most recent access (creation counts as an access)
    pub fn last_accessed(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_access_ms.load(Ordering::Relaxed))
    }

    /// How long the entry has sat untouched
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_accessed())
    }
}

impl Clone for CacheEntry {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_access_ms: AtomicU64::new(self.last_access_ms.load(Ordering::Relaxed)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
