//! Duplicate-work guard: short-lived exclusive leases keyed by stage + entity.
//!
//! A lease is taken before a stage runs for a content item and released when
//! the run ends, whatever the outcome. The TTL bounds how long a crashed worker
//! can keep an item locked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

/// Default lease lifetime.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(300);

/// Proof of ownership of a key until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LeaseError {
    #[error("lease storage error: {0}")]
    Storage(String),
}

/// Exclusive leases over any shared key-value store.
pub trait LeaseStore: Send + Sync {
    /// Take `key` unless a live lease already holds it. Expired leases are
    /// reclaimed.
    fn acquire(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Result<Option<Lease>, LeaseError>;

    /// Release a lease. Returns `false` when the lease had already expired and
    /// been taken by someone else (the newer holder is left alone).
    fn release(&self, lease: &Lease) -> Result<bool, LeaseError>;

    /// Whether `key` is currently held.
    fn is_held(&self, key: &str, now: DateTime<Utc>) -> Result<bool, LeaseError>;
}

impl<S> LeaseStore for Arc<S>
where
    S: LeaseStore + ?Sized,
{
    fn acquire(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Result<Option<Lease>, LeaseError> {
        (**self).acquire(key, ttl, now)
    }

    fn release(&self, lease: &Lease) -> Result<bool, LeaseError> {
        (**self).release(lease)
    }

    fn is_held(&self, key: &str, now: DateTime<Utc>) -> Result<bool, LeaseError> {
        (**self).is_held(key, now)
    }
}

/// Scoped lease: released on drop, so every exit path gives the key back.
pub struct LeaseGuard {
    store: Arc<dyn LeaseStore>,
    lease: Option<Lease>,
}

impl LeaseGuard {
    /// Try to take `key`; `Ok(None)` means someone else holds it.
    pub fn try_acquire(
        store: Arc<dyn LeaseStore>,
        key: impl Into<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, LeaseError> {
        let key = key.into();
        Ok(store.acquire(&key, ttl, now)?.map(|lease| Self {
            store,
            lease: Some(lease),
        }))
    }

    pub fn key(&self) -> &str {
        self.lease.as_ref().map(|l| l.key.as_str()).unwrap_or_default()
    }

    /// Release now instead of at drop.
    pub fn release(mut self) -> Result<bool, LeaseError> {
        match self.lease.take() {
            Some(lease) => self.store.release(&lease),
            None => Ok(false),
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            if let Err(err) = self.store.release(&lease) {
                // The TTL still frees the key eventually.
                warn!(key = %lease.key, error = %err, "failed to release lease");
            }
        }
    }
}

impl std::fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard").field("lease", &self.lease).finish()
    }
}

/// In-process lease store for tests/dev and single-process workers.
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: Mutex<HashMap<String, Lease>>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Lease>>, LeaseError> {
        self.leases
            .lock()
            .map_err(|_| LeaseError::Storage("lease table lock poisoned".to_string()))
    }
}

impl LeaseStore for InMemoryLeaseStore {
    fn acquire(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Result<Option<Lease>, LeaseError> {
        let mut leases = self.locked()?;

        if leases.get(key).is_some_and(|held| held.expires_at > now) {
            return Ok(None);
        }

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| LeaseError::Storage(format!("invalid lease ttl: {e}")))?;
        let lease = Lease {
            key: key.to_string(),
            token: Uuid::now_v7(),
            expires_at: now + ttl,
        };
        leases.insert(key.to_string(), lease.clone());
        Ok(Some(lease))
    }

    fn release(&self, lease: &Lease) -> Result<bool, LeaseError> {
        let mut leases = self.locked()?;

        match leases.get(&lease.key) {
            Some(held) if held.token == lease.token => {
                leases.remove(&lease.key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn is_held(&self, key: &str, now: DateTime<Utc>) -> Result<bool, LeaseError> {
        Ok(self.locked()?.get(key).is_some_and(|held| held.expires_at > now))
    }
}
