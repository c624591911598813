// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Key-value stores backing the engine.
//!
//! Three stores are configured independently:
//! * `source` holds base tables ([`SourceStore`]),
//! * `meta` holds chunk layouts and view definitions,
//! * `tmp` holds the spilled chunks.
//!
//! Each store is a [`Backend`] addressed by `/`-separated keys.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

mod disk;
mod error;
mod memory;
mod source;

pub use self::disk::DiskBackend;
pub use self::error::*;
pub use self::memory::MemoryBackend;
pub use self::source::SourceStore;

pub type BackendRef = Arc<dyn Backend>;

/// A flat key-value store.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Get the value of a key. Returns `None` if the key does not exist.
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Insert or overwrite a key.
    async fn put(&self, key: &str, value: Bytes) -> StorageResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Names of the immediate children under `prefix`, sorted.
    ///
    /// `list("rows/t")` on keys `rows/t/0` and `rows/t/1` returns `["0", "1"]`.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Remove every key under `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()> {
        for child in self.list(prefix).await? {
            let key = format!("{prefix}/{child}");
            self.delete_prefix(&key).await?;
            self.delete(&key).await?;
        }
        Ok(())
    }
}

/// Open a store by url: `memory:` or `file:<path>` / `file://<path>`.
pub async fn open_backend(url: &str) -> StorageResult<BackendRef> {
    let url = url.trim();
    if url == "memory:" || url.starts_with("memory://") {
        return Ok(Arc::new(MemoryBackend::new()));
    }
    if let Some(path) = url.strip_prefix("file:") {
        let path = path.strip_prefix("//").unwrap_or(path);
        if path.is_empty() {
            return Err(StorageError::InvalidUrl(url.into()));
        }
        return Ok(Arc::new(DiskBackend::open(path).await?));
    }
    Err(StorageError::InvalidUrl(url.into()))
}

/// Get a JSON encoded value.
pub async fn get_json<T: DeserializeOwned>(
    backend: &dyn Backend,
    key: &str,
) -> StorageResult<Option<T>> {
    match backend.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Put a value as JSON.
pub async fn put_json<T: Serialize + ?Sized>(
    backend: &dyn Backend,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let bytes = serde_json::to_vec(value)?;
    backend.put(key, bytes.into()).await
}

/// Keys are `/`-separated paths of non-empty segments. A segment never starts with `.`.
pub(crate) fn check_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key
            .split('/')
            .all(|seg| !seg.is_empty() && !seg.starts_with('.') && !seg.contains('\\'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.into()))
    }
}
