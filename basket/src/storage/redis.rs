use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, RedisError};
use async_trait::async_trait;
use tracing::warn;

use crate::storage::{CacheError, CacheProvider};

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        if err.is_timeout() {
            CacheError::Timeout
        } else {
            CacheError::Backend(err.to_string())
        }
    }
}

/// Cache provider over a single multiplexed redis connection. Every key is
/// namespaced with the configured prefix.
pub struct RedisCache {
    connection: MultiplexedConnection,
    prefix: String,
}

impl RedisCache {
    /// A zero duration disables the corresponding timeout.
    pub async fn new(
        addr: String,
        prefix: Option<String>,
        response_timeout: Duration,
        connection_timeout: Duration,
    ) -> Result<RedisCache, CacheError> {
        let client = ::redis::Client::open(addr)?;

        let mut config = ::redis::AsyncConnectionConfig::new();
        if !response_timeout.is_zero() {
            config = config.set_response_timeout(response_timeout);
        }
        if !connection_timeout.is_zero() {
            config = config.set_connection_timeout(connection_timeout);
        }

        let connection = client
            .get_multiplexed_async_connection_with_config(&config)
            .await?;

        Ok(RedisCache {
            connection,
            prefix: prefix.unwrap_or_default(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl CacheProvider for RedisCache {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        match ttl_seconds {
            Some(seconds) => conn.set_ex::<_, _, ()>(self.key(key), value, seconds).await?,
            None => conn.set::<_, _, ()>(self.key(key), value).await?,
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();

        // SET with NX and EX in one round trip, so concurrent writers cannot both win
        let result: Option<String> = ::redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(self.key(key)).await?;
        Ok(exists)
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(self.key(key)).await?;
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        let mut conn = self.connection.clone();
        let pong: Result<String, RedisError> = ::redis::cmd("PING").query_async(&mut conn).await;
        match pong {
            Ok(_) => true,
            Err(err) => {
                warn!("redis health check failed: {}", err);
                false
            }
        }
    }
}
