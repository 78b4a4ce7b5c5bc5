//! Redis backend: plain GET/SET under a key prefix

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::KeyValueStore;
use crate::errors::StoreError;

pub struct RedisStore {
    connection: RwLock<MultiplexedConnection>,
    key_prefix: String,
}

impl RedisStore {
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!(key_prefix = key_prefix, "Connected to Redis store");

        Ok(Self {
            connection: RwLock::new(connection),
            key_prefix: key_prefix.to_string(),
        })
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let full_key = self.key(key);
        let mut conn = self.connection.write().await;
        let value: Option<String> = conn.get(&full_key).await?;
        debug!(key = %full_key, hit = value.is_some(), "Redis read");
        Ok(value)
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let full_key = self.key(key);
        let mut conn = self.connection.write().await;
        let _: () = conn.set(&full_key, value).await?;
        debug!(key = %full_key, bytes = value.len(), "Redis write");
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.write().await;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "redis"
    }
}
