//! Redis connection handling and pub/sub plumbing.

use crate::error::AppResult;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

/// Shared Redis access: a managed connection for commands and the client
/// itself for dedicated pub/sub connections.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `redis_url`.
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        info!(url = %redis_url, "connected to redis");
        Ok(Self { client, manager })
    }

    /// Connection for commands. Cheap to clone; reconnects on its own.
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Publish a payload to a channel (Redis PUBLISH).
    pub async fn publish(&self, channel: &str, payload: &str) -> AppResult<u64> {
        let mut conn = self.connection();
        let count: u64 = conn.publish(channel, payload).await?;
        debug!(channel = %channel, count, "published");
        Ok(count)
    }

    /// Open a dedicated pub/sub connection subscribed to `channels`.
    ///
    /// Pub/sub puts a connection into subscriber mode, so each subscription
    /// gets its own connection instead of sharing the command manager.
    pub async fn pubsub(&self, channels: &[String]) -> AppResult<redis::aio::PubSub> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        for channel in channels {
            pubsub.subscribe(channel).await?;
        }
        Ok(pubsub)
    }
}
