//! Driver directory cache.
//!
//! Memoizes static driver metadata (name, phone, assigned vehicle) in front
//! of a durable store. A driver's record does not change mid-session, so the
//! first lookup's result serves every later sample; the entry is evicted
//! when the driver's ingress connection closes so a reconnect never sees a
//! stale vehicle assignment.
//!
//! Absence is NOT cached: a driver registered after a failed lookup is
//! picked up on the next sample. Racing first-resolves may both hit the
//! store; last insert wins, which is harmless because both loaded the same
//! record.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use buswatch_proto::DriverId;
use serde::{Deserialize, Serialize};

/// Static metadata for one driver, as read from the durable store.
///
/// Cache-only during a relay session; never written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProfile {
    /// Driver id (store primary key).
    pub id: DriverId,
    /// Display name shown on the map.
    pub display_name: String,
    /// Contact phone number.
    pub phone_number: String,
    /// Assigned vehicle label; `None` when the driver has no bus assigned.
    pub assigned_vehicle_label: Option<String>,
}

/// Errors from the durable driver store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failed (database unreachable, read error).
    #[error("driver store I/O: {0}")]
    Io(String),

    /// A stored record could not be decoded.
    #[error("driver store decode: {0}")]
    Decode(String),
}

/// Durable driver-record store, queried by driver id.
///
/// Implementations are read-only from the relay's point of view. `None`
/// means the driver does not exist - distinct from a store failure.
#[async_trait]
pub trait DriverStore: Send + Sync + 'static {
    /// Load one driver record. `Ok(None)` when absent.
    async fn load(&self, driver_id: DriverId) -> Result<Option<DriverProfile>, StoreError>;
}

/// Errors from a directory resolution attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    /// No record exists for this driver id.
    #[error("driver {0} not found")]
    NotFound(DriverId),

    /// The store failed; treated like NotFound by the relay (the sample is
    /// dropped), but kept distinct for logging.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cache-first resolver for driver metadata.
///
/// Thread-safe: the cache lock is held only around map operations, never
/// across the store await, so concurrent samples from other drivers are not
/// serialized behind one slow lookup.
#[derive(Debug)]
pub struct DriverDirectory<S> {
    store: S,
    cache: Mutex<HashMap<DriverId, DriverProfile>>,
}

impl<S: DriverStore> DriverDirectory<S> {
    /// Create a directory in front of the given store.
    pub fn new(store: S) -> Self {
        Self { store, cache: Mutex::new(HashMap::new()) }
    }

    /// Resolve a driver's profile, cache-first.
    ///
    /// # Panics
    ///
    /// Panics if the cache mutex is poisoned (a thread panicked while
    /// holding it).
    #[allow(clippy::expect_used)]
    pub async fn resolve(&self, driver_id: DriverId) -> Result<DriverProfile, DirectoryError> {
        if let Some(profile) = self.cache.lock().expect("cache mutex poisoned").get(&driver_id) {
            return Ok(profile.clone());
        }

        let profile = self
            .store
            .load(driver_id)
            .await?
            .ok_or(DirectoryError::NotFound(driver_id))?;

        self.cache
            .lock()
            .expect("cache mutex poisoned")
            .insert(driver_id, profile.clone());

        tracing::debug!(driver_id, "driver profile cached");
        Ok(profile)
    }

    /// Evict a driver's cached profile.
    ///
    /// Called when the driver's last ingress connection closes.
    ///
    /// # Panics
    ///
    /// Panics if the cache mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn invalidate(&self, driver_id: DriverId) {
        if self.cache.lock().expect("cache mutex poisoned").remove(&driver_id).is_some() {
            tracing::debug!(driver_id, "driver profile evicted");
        }
    }

    /// Number of cached profiles.
    ///
    /// # Panics
    ///
    /// Panics if the cache mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn cached_count(&self) -> usize {
        self.cache.lock().expect("cache mutex poisoned").len()
    }
}

/// In-memory driver store for tests and local runs.
///
/// Seedable at any time; clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriverStore {
    inner: Arc<Mutex<HashMap<DriverId, DriverProfile>>>,
}

impl MemoryDriverStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a driver record.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn insert(&self, profile: DriverProfile) {
        self.inner.lock().expect("store mutex poisoned").insert(profile.id, profile);
    }
}

#[async_trait]
impl DriverStore for MemoryDriverStore {
    #[allow(clippy::expect_used)]
    async fn load(&self, driver_id: DriverId) -> Result<Option<DriverProfile>, StoreError> {
        Ok(self.inner.lock().expect("store mutex poisoned").get(&driver_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn profile(id: DriverId) -> DriverProfile {
        DriverProfile {
            id,
            display_name: format!("Driver {id}"),
            phone_number: "555".into(),
            assigned_vehicle_label: Some("BUS-1".into()),
        }
    }

    /// Store wrapper that counts how often the backing store is hit.
    #[derive(Clone)]
    struct CountingStore {
        inner: MemoryDriverStore,
        loads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DriverStore for CountingStore {
        async fn load(&self, driver_id: DriverId) -> Result<Option<DriverProfile>, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load(driver_id).await
        }
    }

    /// Store that always fails.
    #[derive(Clone)]
    struct BrokenStore;

    #[async_trait]
    impl DriverStore for BrokenStore {
        async fn load(&self, _: DriverId) -> Result<Option<DriverProfile>, StoreError> {
            Err(StoreError::Io("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn second_resolve_hits_the_cache() {
        let store = MemoryDriverStore::new();
        store.insert(profile(42));
        let loads = Arc::new(AtomicUsize::new(0));
        let directory =
            DriverDirectory::new(CountingStore { inner: store, loads: Arc::clone(&loads) });

        assert_eq!(directory.resolve(42).await.unwrap().id, 42);
        assert_eq!(directory.resolve(42).await.unwrap().id, 42);

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn absence_is_not_cached() {
        let store = MemoryDriverStore::new();
        let directory = DriverDirectory::new(store.clone());

        assert!(matches!(directory.resolve(42).await, Err(DirectoryError::NotFound(42))));
        assert_eq!(directory.cached_count(), 0);

        // Driver registers later; next attempt must see it.
        store.insert(profile(42));
        assert_eq!(directory.resolve(42).await.unwrap().id, 42);
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_lookup() {
        let store = MemoryDriverStore::new();
        store.insert(profile(42));
        let loads = Arc::new(AtomicUsize::new(0));
        let directory =
            DriverDirectory::new(CountingStore { inner: store, loads: Arc::clone(&loads) });

        directory.resolve(42).await.unwrap();
        directory.invalidate(42);
        directory.resolve(42).await.unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn store_failure_propagates_as_error() {
        let directory = DriverDirectory::new(BrokenStore);
        assert!(matches!(directory.resolve(42).await, Err(DirectoryError::Store(_))));
        assert_eq!(directory.cached_count(), 0);
    }
}
