//! Shared key-value record store.
//!
//! Every client session of the portal reads and writes the same store. Plain `put` is
//! last-write-wins; anything that must not be clobbered by a concurrent writer goes
//! through [`RecordStore::put_if_absent`] or [`RecordStore::compare_and_swap`].

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub use self::memory::MemoryRecordStore;
pub use self::redis_store::RedisRecordStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// All records whose key starts with `prefix`, ordered by key.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Writes `value` only if `key` is unset. Returns whether the write happened.
    async fn put_if_absent(&self, key: &str, value: Value) -> Result<bool, StoreError>;

    /// Atomically replaces the record at `key` if it currently equals `expected`
    /// (`None` meaning absent). A `new` of `None` deletes the key.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Value>,
        new: Option<Value>,
    ) -> Result<bool, StoreError>;

    /// Monotonic counter owned by the store; the first value handed out is 1.
    async fn next_sequence(&self, name: &str) -> Result<u64, StoreError>;
}

pub fn to_value<T: Serialize>(record: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(record)?)
}

pub async fn get_record<T: DeserializeOwned>(
    store: &dyn RecordStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub async fn put_record<T: Serialize>(
    store: &dyn RecordStore,
    key: &str,
    record: &T,
) -> Result<(), StoreError> {
    store.put(key, to_value(record)?).await
}

/// Records under `prefix` that deserialize as `T`. Rows that do not (hand-edited or
/// written by an older client) are skipped with a warning.
pub async fn list_records<T: DeserializeOwned>(
    store: &dyn RecordStore,
    prefix: &str,
) -> Result<Vec<T>, StoreError> {
    let rows = store.list(prefix).await?;
    let mut records = Vec::with_capacity(rows.len());

    for (key, value) in rows {
        match serde_json::from_value(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping unreadable record {}: {}", key, e),
        }
    }

    Ok(records)
}
