//! Redis-backed [`DistributedCache`].

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::instrument;

use super::traits::DistributedCache;
use crate::{MimirError, Result};

/// Shared answer cache in Redis. Values are plain strings set with `EX`.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// Connect to `url` (e.g. `redis://localhost:6379`).
    ///
    /// The connection manager reconnects on its own after failures, so a
    /// cache created while Redis is up keeps working across restarts.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(cache_error)?;
        let connection = ConnectionManager::new(client).await.map_err(cache_error)?;
        Ok(Self { connection })
    }
}

fn cache_error(e: redis::RedisError) -> MimirError {
    MimirError::CacheUnavailable(e.to_string())
}

#[async_trait]
impl DistributedCache for RedisCache {
    fn name(&self) -> &str {
        "redis"
    }

    #[instrument(name = "redis.get", skip_all)]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get::<_, Option<String>>(key).await.map_err(cache_error)
    }

    #[instrument(name = "redis.set", skip_all)]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(cache_error)
    }
}
