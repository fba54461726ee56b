use super::CounterStore;
use crate::error::TradeError;
use crate::Result;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

const KEY_PREFIX: &str = "spreadbot";

/// Redis-backed scratch state
///
/// Scalars are plain string keys, set slots are Redis sets.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| TradeError::Store("Redis connection timeout after 5 seconds".into()))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    fn key(name: &str) -> String {
        format!("{}:{}", KEY_PREFIX, name)
    }
}

impl CounterStore for RedisCounterStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(Self::key(key)).await?;
        Ok(value)
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(Self::key(key), value).await?;
        Ok(())
    }

    async fn members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut members: Vec<String> = conn.smembers(Self::key(key)).await?;
        members.sort();
        Ok(members)
    }

    async fn append(&self, key: &str, token: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(Self::key(key), token).await?;
        Ok(())
    }

    async fn remove(&self, key: &str, token: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(Self::key(key), token).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_connection_timeout() {
        // Try to connect to non-existent Redis
        let result = RedisCounterStore::new("redis://192.0.2.1:6379").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_write_then_read() {
        let store = RedisCounterStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        store.write("test_total_profit", "3.25").await.unwrap();
        let reopened = RedisCounterStore::new("redis://127.0.0.1:6379").await.unwrap();
        assert_eq!(
            reopened.read("test_total_profit").await.unwrap(),
            Some("3.25".to_string())
        );
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_set_slots() {
        let store = RedisCounterStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        store.remove("test_active", "BTC").await.unwrap();
        store.append("test_active", "BTC").await.unwrap();
        assert!(store
            .members("test_active")
            .await
            .unwrap()
            .contains(&"BTC".to_string()));

        store.remove("test_active", "BTC").await.unwrap();
        assert!(store.members("test_active").await.unwrap().is_empty());
    }
}
