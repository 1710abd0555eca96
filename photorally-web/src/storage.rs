//! `localStorage`-backed structured store.
//!
//! Structured records (game state, team ledgers, seen achievements and the
//! migration marker) are small JSON documents, so they live in
//! `localStorage` under namespaced keys. Photo payloads never pass through
//! here; see [`crate::photos`].

use gloo::storage::errors::StorageError;
use gloo::storage::{LocalStorage, Storage};
use photorally_game::{StateStore, StoreError};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// [`StateStore`] implementation over the browser's `localStorage`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebStateStore;

impl WebStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn map_error(err: StorageError) -> StoreError {
    match err {
        StorageError::SerdeError(err) => StoreError::Serialization(err),
        StorageError::JsError(js) => {
            let message = format!("{js:?}");
            if message.contains("QuotaExceeded") {
                StoreError::QuotaExceeded
            } else {
                StoreError::Backend(message)
            }
        }
        StorageError::KeyNotFound(key) => StoreError::Backend(format!("key {key} not found")),
    }
}

impl StateStore for WebStateStore {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match LocalStorage::get(key) {
            Ok(value) => Ok(Some(value)),
            Err(StorageError::KeyNotFound(_)) => Ok(None),
            Err(err) => Err(map_error(err)),
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        LocalStorage::set(key, value).map_err(map_error)
    }

    fn remove(&self, key: &str) {
        LocalStorage::delete(key);
    }

    fn contains(&self, key: &str) -> bool {
        LocalStorage::raw()
            .get_item(key)
            .ok()
            .flatten()
            .is_some()
    }
}
