//! Device-local storage: the progress cache and the host's offline document store.

use async_trait::async_trait;
use js_sys::{Function, Promise, Reflect, Uint8Array};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Storage, Window};

use pagemark_shared::ReadingProgress;

use crate::error::ApiError;
use crate::loader::OfflineBlobs;
use crate::persistence::{decode_progress, encode_progress, progress_key, ProgressCache};

pub struct LocalStorageCache {
    storage: Storage,
}

impl LocalStorageCache {
    /// `None` when `localStorage` is blocked.
    pub fn open(window: &Window) -> Option<Self> {
        let storage = window.local_storage().ok().flatten()?;
        Some(Self { storage })
    }
}

impl ProgressCache for LocalStorageCache {
    fn read(&self, document_id: &str) -> Option<ReadingProgress> {
        let raw = self.storage.get_item(&progress_key(document_id)).ok()??;
        decode_progress(&raw)
    }

    fn write(&self, document_id: &str, progress: &ReadingProgress) {
        let Some(raw) = encode_progress(progress) else {
            return;
        };
        if let Err(error) = self.storage.set_item(&progress_key(document_id), &raw) {
            log::warn!("could not cache progress locally: {error:?}");
        }
    }
}

/// Wraps the host object exposing `get(documentId) -> Promise<Uint8Array | null>`.
pub struct JsOfflineBlobs {
    store: Option<JsValue>,
}

impl JsOfflineBlobs {
    pub fn new(store: JsValue) -> Self {
        let store = (!store.is_undefined() && !store.is_null()).then_some(store);
        Self { store }
    }
}

#[async_trait(?Send)]
impl OfflineBlobs for JsOfflineBlobs {
    async fn get(&self, document_id: &str) -> Result<Option<Vec<u8>>, ApiError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let get: Function = Reflect::get(store, &JsValue::from_str("get"))
            .ok()
            .and_then(|value| value.dyn_into().ok())
            .ok_or_else(|| ApiError::Decode("offline store has no get()".into()))?;
        let result = get
            .call1(store, &JsValue::from_str(document_id))
            .map_err(|error| ApiError::Network(format!("{error:?}")))?;
        let value = match result.dyn_into::<Promise>() {
            Ok(promise) => JsFuture::from(promise)
                .await
                .map_err(|error| ApiError::Network(format!("{error:?}")))?,
            Err(value) => value,
        };
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        let bytes = value
            .dyn_into::<Uint8Array>()
            .map_err(|_| ApiError::Decode("offline blob is not a Uint8Array".into()))?;
        Ok(Some(bytes.to_vec()))
    }
}
