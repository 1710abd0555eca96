//! In-memory storage backends.
//!
//! Used by native tests and as the reference semantics for the browser
//! backends in `photorally-web`. All handles are cheap clones sharing one
//! underlying map, so a test can hold a handle while the session owns
//! another.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::{Clock, PhotoStore, PhotoStores, QuotaStatus, StateStore, StoreError};

/// Structured store over a shared in-memory map of JSON strings.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    records: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON currently stored under `key`, for assertions.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.records.borrow().get(key).cloned()
    }
}

impl StateStore for MemoryStateStore {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.records.borrow().get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.records.borrow_mut().insert(key.to_string(), raw);
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.records.borrow_mut().remove(key);
    }

    fn contains(&self, key: &str) -> bool {
        self.records.borrow().contains_key(key)
    }
}

type PhotoBuckets = Rc<RefCell<BTreeMap<String, BTreeMap<String, String>>>>;

/// Photo store provider holding one bucket per namespace.
#[derive(Debug, Clone, Default)]
pub struct MemoryPhotoStores {
    buckets: PhotoBuckets,
    fail_writes: Rc<Cell<bool>>,
    quota_pct: Rc<Cell<f64>>,
}

impl MemoryPhotoStores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail with a quota error, for
    /// fault-injection tests of the two-phase write protocol.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Pretend the host reports this usage percentage.
    pub fn set_quota_pct(&self, pct: f64) {
        self.quota_pct.set(pct);
    }
}

impl PhotoStores for MemoryPhotoStores {
    type Store = MemoryPhotoStore;

    fn open(&self, namespace: &str) -> MemoryPhotoStore {
        MemoryPhotoStore {
            buckets: Rc::clone(&self.buckets),
            namespace: namespace.to_string(),
            fail_writes: Rc::clone(&self.fail_writes),
            quota_pct: Rc::clone(&self.quota_pct),
        }
    }
}

/// One namespace of a [`MemoryPhotoStores`].
#[derive(Debug, Clone)]
pub struct MemoryPhotoStore {
    buckets: PhotoBuckets,
    namespace: String,
    fail_writes: Rc<Cell<bool>>,
    quota_pct: Rc<Cell<f64>>,
}

impl MemoryPhotoStore {
    /// Standalone store backed by its own provider, for simple tests.
    #[must_use]
    pub fn new() -> Self {
        MemoryPhotoStores::new().open("default")
    }

    /// Number of payloads in this namespace.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets
            .borrow()
            .get(&self.namespace)
            .map_or(0, BTreeMap::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryPhotoStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl PhotoStore for MemoryPhotoStore {
    async fn save(&self, key: &str, payload: &str) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::QuotaExceeded);
        }
        let status = self.quota().await;
        if !status.ok {
            return Err(StoreError::QuotaExceeded);
        }
        self.buckets
            .borrow_mut()
            .entry(self.namespace.clone())
            .or_default()
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .buckets
            .borrow()
            .get(&self.namespace)
            .and_then(|bucket| bucket.get(key).cloned()))
    }

    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<BTreeMap<String, Option<String>>, StoreError> {
        let buckets = self.buckets.borrow();
        let bucket = buckets.get(&self.namespace);
        Ok(keys
            .iter()
            .map(|key| {
                let value = bucket.and_then(|b| b.get(key).cloned());
                (key.clone(), value)
            })
            .collect())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self
            .buckets
            .borrow()
            .get(&self.namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if let Some(bucket) = self.buckets.borrow_mut().get_mut(&self.namespace) {
            bucket.remove(key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.buckets.borrow_mut().remove(&self.namespace);
        Ok(())
    }

    async fn quota(&self) -> QuotaStatus {
        let pct = self.quota_pct.get();
        if pct <= 0.0 {
            QuotaStatus::unlimited()
        } else {
            QuotaStatus::from_pct(pct)
        }
    }
}

/// Deterministic clock for tests; `advance` moves it forward in place.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl FixedClock {
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn save_get_delete_round_trip() {
        let store = MemoryPhotoStore::new();
        block_on(async {
            store.save("main_1", "data:image/jpeg;base64,AAA").await.unwrap();
            assert_eq!(
                store.get("main_1").await.unwrap().as_deref(),
                Some("data:image/jpeg;base64,AAA")
            );
            assert_eq!(store.get("main_2").await.unwrap(), None);
            // Deleting a missing key is a no-op.
            store.delete("main_2").await.unwrap();
            store.delete("main_1").await.unwrap();
            assert!(store.is_empty());
        });
    }

    #[test]
    fn get_many_covers_absent_keys() {
        let store = MemoryPhotoStore::new();
        block_on(async {
            store.save("main_1", "a").await.unwrap();
            let keys = vec!["main_1".to_string(), "bonus_1".to_string()];
            let map = store.get_many(&keys).await.unwrap();
            assert_eq!(map.len(), 2);
            assert_eq!(map["main_1"].as_deref(), Some("a"));
            assert_eq!(map["bonus_1"], None);
        });
    }

    #[test]
    fn namespaces_are_isolated() {
        let stores = MemoryPhotoStores::new();
        let coast = stores.open("coast");
        let city = stores.open("city");
        block_on(async {
            coast.save("main_1", "coast-photo").await.unwrap();
            assert_eq!(city.get("main_1").await.unwrap(), None);
            city.clear().await.unwrap();
            assert_eq!(coast.get("main_1").await.unwrap().as_deref(), Some("coast-photo"));
        });
    }

    #[test]
    fn quota_pressure_rejects_saves_proactively() {
        let stores = MemoryPhotoStores::new();
        let store = stores.open("coast");
        stores.set_quota_pct(97.0);
        block_on(async {
            let err = store.save("main_1", "x").await.expect_err("blocked");
            assert!(matches!(err, StoreError::QuotaExceeded));
            assert!(store.is_empty(), "rejected write must not persist");
        });
        stores.set_quota_pct(85.0);
        block_on(async {
            assert!(store.quota().await.warning);
            store.save("main_1", "x").await.expect("warn still writes");
        });
    }
}
