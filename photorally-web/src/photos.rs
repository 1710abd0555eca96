//! IndexedDB-backed photo payload store.
//!
//! Photo payloads are data-URL strings far too large for `localStorage`,
//! so each rally namespace gets its own IndexedDB database holding a
//! single `photos` object store keyed by photo key. The engine's
//! write protocol (photo first, structured state second) relies on
//! [`WebPhotoStore::save`] failing cleanly before the state write happens,
//! so every write resolves on transaction commit, not on request success:
//! a `put` request can succeed while the transaction still aborts at
//! commit time (typically with `QuotaExceededError`).

use std::cell::RefCell;
use std::collections::BTreeMap;

use async_trait::async_trait;
use js_sys::{Function, Promise, Reflect};
use photorally_game::{PhotoStore, PhotoStores, QuotaStatus, StoreError};
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Event, IdbDatabase, IdbObjectStore, IdbOpenDbRequest, IdbRequest, IdbTransaction,
    IdbTransactionMode,
};

use crate::dom::{js_error_message, window};

const STORE_NAME: &str = "photos";
const DB_VERSION: u32 = 1;

fn js_backend(err: JsValue) -> StoreError {
    StoreError::Backend(js_error_message(&err))
}

/// Resolve an `IdbRequest` into a future in the browser's event loop.
#[allow(clippy::future_not_send)] // Wasm futures rely on `JsFuture`, which is not `Send`.
async fn await_request(request: IdbRequest) -> Result<JsValue, StoreError> {
    let mut callbacks: Option<(Function, Function)> = None;
    let promise = Promise::new(&mut |resolve, reject| {
        callbacks = Some((resolve, reject));
    });
    let (resolve, reject) = callbacks
        .ok_or_else(|| StoreError::Backend("promise executor did not run".to_owned()))?;

    let success_request = request.clone();
    let success = Closure::once_into_js(move |_event: Event| {
        let value = success_request.result().unwrap_or(JsValue::UNDEFINED);
        let _ = resolve.call1(&JsValue::UNDEFINED, &value);
    });
    request.set_onsuccess(Some(success.unchecked_ref()));

    let failure_request = request.clone();
    let failure = Closure::once_into_js(move |_event: Event| {
        let reason = failure_request
            .error()
            .ok()
            .flatten()
            .map(|err| JsValue::from(err.message()))
            .unwrap_or_else(|| JsValue::from_str("IndexedDB request failed"));
        let _ = reject.call1(&JsValue::UNDEFINED, &reason);
    });
    request.set_onerror(Some(failure.unchecked_ref()));

    JsFuture::from(promise)
        .await
        .map_err(|err| StoreError::Backend(js_error_message(&err)))
}

/// Resolve a transaction when it commits. An abort surfaces the
/// transaction error instead, mapped to [`StoreError::QuotaExceeded`]
/// when the browser ran out of space at commit time. Every mutation goes
/// through this; resolving on request success alone would report writes
/// the transaction later threw away.
#[allow(clippy::future_not_send)]
async fn await_commit(tx: &IdbTransaction) -> Result<(), StoreError> {
    let mut callbacks: Option<(Function, Function)> = None;
    let promise = Promise::new(&mut |resolve, reject| {
        callbacks = Some((resolve, reject));
    });
    let (resolve, reject) = callbacks
        .ok_or_else(|| StoreError::Backend("promise executor did not run".to_owned()))?;

    let complete = Closure::once_into_js(move |_event: Event| {
        let _ = resolve.call0(&JsValue::UNDEFINED);
    });
    tx.set_oncomplete(Some(complete.unchecked_ref()));

    // A failed request bubbles up and aborts the transaction, so the
    // abort handler covers request errors and commit-time failures alike.
    let abort_tx = tx.clone();
    let abort = Closure::once_into_js(move |_event: Event| {
        let reason = abort_tx
            .error()
            .map(|err| JsValue::from(format!("{}: {}", err.name(), err.message())))
            .unwrap_or_else(|| JsValue::from_str("IndexedDB transaction aborted"));
        let _ = reject.call1(&JsValue::UNDEFINED, &reason);
    });
    tx.set_onabort(Some(abort.unchecked_ref()));

    JsFuture::from(promise).await.map(|_| ()).map_err(|err| {
        let message = js_error_message(&err);
        if message.contains("QuotaExceeded") {
            StoreError::QuotaExceeded
        } else {
            StoreError::Backend(message)
        }
    })
}

/// [`PhotoStore`] implementation over one IndexedDB database.
///
/// The database handle is opened lazily on first use and cached for the
/// lifetime of the store.
pub struct WebPhotoStore {
    db_name: String,
    db: RefCell<Option<IdbDatabase>>,
}

impl WebPhotoStore {
    #[must_use]
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            db: RefCell::new(None),
        }
    }

    #[allow(clippy::future_not_send)]
    async fn database(&self) -> Result<IdbDatabase, StoreError> {
        if let Some(db) = self.db.borrow().as_ref() {
            return Ok(db.clone());
        }

        let factory = window()
            .indexed_db()
            .map_err(js_backend)?
            .ok_or(StoreError::Unavailable)?;
        let request = factory
            .open_with_u32(&self.db_name, DB_VERSION)
            .map_err(js_backend)?;

        let upgrade = Closure::once_into_js(move |event: Event| {
            let Some(target) = event.target() else { return };
            let Ok(open_request) = target.dyn_into::<IdbOpenDbRequest>() else {
                return;
            };
            let Ok(result) = open_request.result() else {
                return;
            };
            if let Ok(db) = result.dyn_into::<IdbDatabase>() {
                if !db.object_store_names().contains(STORE_NAME) {
                    let _ = db.create_object_store(STORE_NAME);
                }
            }
        });
        request.set_onupgradeneeded(Some(upgrade.unchecked_ref()));

        let value = await_request(request.into()).await?;
        let db: IdbDatabase = value
            .dyn_into()
            .map_err(|_| StoreError::Backend("IndexedDB open returned no database".to_owned()))?;
        *self.db.borrow_mut() = Some(db.clone());
        Ok(db)
    }

    #[allow(clippy::future_not_send)]
    async fn transaction(
        &self,
        mode: IdbTransactionMode,
    ) -> Result<(IdbTransaction, IdbObjectStore), StoreError> {
        let db = self.database().await?;
        let tx = db
            .transaction_with_str_and_mode(STORE_NAME, mode)
            .map_err(js_backend)?;
        let store = tx.object_store(STORE_NAME).map_err(js_backend)?;
        Ok((tx, store))
    }
}

#[async_trait(?Send)]
impl PhotoStore for WebPhotoStore {
    async fn save(&self, key: &str, payload: &str) -> Result<(), StoreError> {
        let status = self.quota().await;
        if !status.ok {
            return Err(StoreError::QuotaExceeded);
        }
        if status.warning {
            log::warn!("photo storage nearing quota ({:.0}% used)", status.pct);
        }

        let (tx, store) = self.transaction(IdbTransactionMode::Readwrite).await?;
        store
            .put_with_key(&JsValue::from_str(payload), &JsValue::from_str(key))
            .map_err(js_backend)?;
        await_commit(&tx).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let (_tx, store) = self.transaction(IdbTransactionMode::Readonly).await?;
        let request = store.get(&JsValue::from_str(key)).map_err(js_backend)?;
        let value = await_request(request).await?;
        Ok(value.as_string())
    }

    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<BTreeMap<String, Option<String>>, StoreError> {
        let mut out = BTreeMap::new();
        for key in keys {
            out.insert(key.clone(), self.get(key).await?);
        }
        Ok(out)
    }

    async fn get_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let (_tx, store) = self.transaction(IdbTransactionMode::Readonly).await?;
        let keys_request = store.get_all_keys().map_err(js_backend)?;
        let values_request = store.get_all().map_err(js_backend)?;
        let keys = js_sys::Array::from(&await_request(keys_request).await?);
        let values = js_sys::Array::from(&await_request(values_request).await?);

        let mut out = BTreeMap::new();
        for (key, value) in keys.iter().zip(values.iter()) {
            if let (Some(key), Some(value)) = (key.as_string(), value.as_string()) {
                out.insert(key, value);
            }
        }
        Ok(out)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let (tx, store) = self.transaction(IdbTransactionMode::Readwrite).await?;
        store.delete(&JsValue::from_str(key)).map_err(js_backend)?;
        await_commit(&tx).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let (tx, store) = self.transaction(IdbTransactionMode::Readwrite).await?;
        store.clear().map_err(js_backend)?;
        await_commit(&tx).await
    }

    async fn quota(&self) -> QuotaStatus {
        let Some(window) = web_sys::window() else {
            return QuotaStatus::unlimited();
        };
        let navigator = window.navigator();
        // Older engines ship without the Storage API; treat those as
        // unlimited rather than blocking every save.
        if !Reflect::has(navigator.as_ref(), &JsValue::from_str("storage")).unwrap_or(false) {
            return QuotaStatus::unlimited();
        }
        let Ok(promise) = navigator.storage().estimate() else {
            return QuotaStatus::unlimited();
        };
        let Ok(estimate) = JsFuture::from(promise).await else {
            return QuotaStatus::unlimited();
        };

        let usage = Reflect::get(&estimate, &JsValue::from_str("usage"))
            .ok()
            .and_then(|value| value.as_f64());
        let quota = Reflect::get(&estimate, &JsValue::from_str("quota"))
            .ok()
            .and_then(|value| value.as_f64());
        match (usage, quota) {
            (Some(usage), Some(quota)) if quota > 0.0 => {
                QuotaStatus::from_pct(usage / quota * 100.0)
            }
            _ => QuotaStatus::unlimited(),
        }
    }
}

/// Opens one [`WebPhotoStore`] per rally namespace; the namespace doubles
/// as the IndexedDB database name.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebPhotoStores;

impl PhotoStores for WebPhotoStores {
    type Store = WebPhotoStore;

    fn open(&self, namespace: &str) -> WebPhotoStore {
        WebPhotoStore::new(namespace)
    }
}
