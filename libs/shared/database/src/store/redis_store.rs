use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, Script};
use serde_json::Value;
use tracing::{debug, error, info};

use super::{RecordStore, StoreError};

// KEYS[1] = record key
// ARGV = expected_present, expected, new_present, new
const COMPARE_AND_SWAP_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
    if current ~= ARGV[2] then
        return 0
    end
elseif current then
    return 0
end
if ARGV[3] == '1' then
    redis.call('SET', KEYS[1], ARGV[4])
else
    redis.call('DEL', KEYS[1])
end
return 1
"#;

/// Durable store shared by every API process pointing at the same Redis.
pub struct RedisRecordStore {
    pool: Pool,
    namespace: String,
}

impl RedisRecordStore {
    pub async fn new(redis_url: &str, namespace: &str) -> Result<Self, StoreError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Pool(format!("Failed to create Redis pool: {}", e)))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to connect to Redis: {}", e)))?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis record store initialized (namespace '{}')", namespace);

        Ok(Self {
            pool,
            namespace: namespace.to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    async fn get_connection(&self) -> Result<Connection, StoreError> {
        self.pool.get().await.map_err(|e| {
            error!("Failed to get Redis connection: {}", e);
            StoreError::Pool(e.to_string())
        })
    }
}

fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut conn = self.get_connection().await?;
        let raw: Option<String> = conn.get(self.key(key)).await?;
        match raw {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let data = serde_json::to_string(&value)?;
        let _: () = conn.set(self.key(key), data).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let mut conn = self.get_connection().await?;
        let pattern = format!("{}*", escape_glob(&self.key(prefix)));

        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter: redis::AsyncIter<String> = conn.scan_match(&pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        keys.sort();
        keys.dedup();

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let strip = self.namespace.len() + 1;
        let mut rows = Vec::with_capacity(keys.len());
        for (key, raw) in keys.into_iter().zip(values) {
            // Deleted between SCAN and MGET.
            let Some(data) = raw else { continue };
            rows.push((key[strip..].to_string(), serde_json::from_str(&data)?));
        }

        debug!("Listed {} records under '{}'", rows.len(), prefix);
        Ok(rows)
    }

    async fn put_if_absent(&self, key: &str, value: Value) -> Result<bool, StoreError> {
        let mut conn = self.get_connection().await?;
        let data = serde_json::to_string(&value)?;
        let created: bool = conn.set_nx(self.key(key), data).await?;
        Ok(created)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Value>,
        new: Option<Value>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.get_connection().await?;

        let (expected_present, expected_data) = match &expected {
            Some(value) => ("1", serde_json::to_string(value)?),
            None => ("0", String::new()),
        };
        let (new_present, new_data) = match &new {
            Some(value) => ("1", serde_json::to_string(value)?),
            None => ("0", String::new()),
        };

        let swapped: i32 = Script::new(COMPARE_AND_SWAP_SCRIPT)
            .key(self.key(key))
            .arg(expected_present)
            .arg(expected_data)
            .arg(new_present)
            .arg(new_data)
            .invoke_async(&mut conn)
            .await?;

        Ok(swapped == 1)
    }

    async fn next_sequence(&self, name: &str) -> Result<u64, StoreError> {
        let mut conn = self.get_connection().await?;
        let value: u64 = conn.incr(self.key(&format!("sequence/{}", name)), 1u64).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::escape_glob;

    #[test]
    fn glob_characters_are_escaped() {
        assert_eq!(escape_glob("clinic:slots/d1"), "clinic:slots/d1");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }
}
