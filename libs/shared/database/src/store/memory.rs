use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{RecordStore, StoreError};

/// In-process store. Shared by cloning; every clone sees the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<BTreeMap<String, Value>>>,
    sequences: Arc<RwLock<HashMap<String, u64>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.insert(key.to_string(), value);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn put_if_absent(&self, key: &str, value: Value) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(key) {
            return Ok(false);
        }
        records.insert(key.to_string(), value);
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Value>,
        new: Option<Value>,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        if records.get(key) != expected.as_ref() {
            return Ok(false);
        }

        match new {
            Some(value) => {
                records.insert(key.to_string(), value);
            }
            None => {
                records.remove(key);
            }
        }
        Ok(true)
    }

    async fn next_sequence(&self, name: &str) -> Result<u64, StoreError> {
        let mut sequences = self.sequences.write().await;
        let counter = sequences.entry(name.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn list_only_returns_matching_prefix_in_key_order() {
        let store = MemoryRecordStore::new();
        store.put("presence/d2", json!(2)).await.unwrap();
        store.put("presence/d1", json!(1)).await.unwrap();
        store.put("presences", json!(0)).await.unwrap();
        store.put("requests/r1", json!(3)).await.unwrap();

        let rows = store.list("presence/").await.unwrap();
        let keys: Vec<_> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["presence/d1", "presence/d2"]);
    }

    #[tokio::test]
    async fn compare_and_swap_requires_exact_current_value() {
        let store = MemoryRecordStore::new();
        assert!(store.compare_and_swap("k", None, Some(json!("a"))).await.unwrap());
        assert!(!store.compare_and_swap("k", None, Some(json!("b"))).await.unwrap());
        assert!(!store.compare_and_swap("k", Some(json!("x")), Some(json!("b"))).await.unwrap());
        assert!(store.compare_and_swap("k", Some(json!("a")), None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sequences_are_independent_and_start_at_one() {
        let store = MemoryRecordStore::new();
        assert_eq!(store.next_sequence("appointments").await.unwrap(), 1);
        assert_eq!(store.next_sequence("appointments").await.unwrap(), 2);
        assert_eq!(store.next_sequence("other").await.unwrap(), 1);
    }
}
