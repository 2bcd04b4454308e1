use anyhow::{Error, Result, anyhow};
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::{Config, RateLimitConfig},
    models::channel::Channel,
};

const RATE_LIMIT_KEY_PREFIX: &str = "notification:rate_limit:";

/// Fixed-window per-(channel, user) send counter backed by Redis.
///
/// Check and record are separate calls, so concurrent requests for the same
/// user can transiently over-admit. This is a soft limit: the increment
/// itself is atomic, only the check window races.
#[derive(Clone)]
pub struct RateLimiter {
    connection: MultiplexedConnection,
    config: Config,
}

impl RateLimiter {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let client = Client::open(config.redis_url.as_str())
            .map_err(|_| anyhow!("Failed to create redis client"))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|_| anyhow!("Failed to connect to redis"))?;

        Ok(Self {
            connection,
            config: config.clone(),
        })
    }

    /// Whether another send is currently within quota. Read-only: callers
    /// must follow up with `record_attempt` after admitting the send.
    pub async fn is_allowed(&mut self, user_id: Uuid, channel: Channel) -> Result<bool, Error> {
        let key = Self::build_key(user_id, channel);
        let limit = self.config.rate_limit(channel);

        let current: Option<u32> = self
            .connection
            .get(&key)
            .await
            .map_err(|e| anyhow!("Failed to read rate limit counter: {}", e))?;
        let current = current.unwrap_or(0);

        let allowed = current < limit.max_requests;

        if !allowed {
            warn!(
                user_id = %user_id,
                channel = %channel,
                current,
                max = limit.max_requests,
                "Rate limit exceeded"
            );
        }

        Ok(allowed)
    }

    /// Atomically count one send. The window TTL is attached only when the
    /// increment creates the key, so the window is fixed from the first send.
    pub async fn record_attempt(&mut self, user_id: Uuid, channel: Channel) -> Result<(), Error> {
        let key = Self::build_key(user_id, channel);
        let limit = self.config.rate_limit(channel);

        let count: u32 = self
            .connection
            .incr(&key, 1)
            .await
            .map_err(|e| anyhow!("Failed to increment rate limit counter: {}", e))?;

        if count == 1 {
            self.connection
                .expire::<_, ()>(&key, limit.window_seconds as i64)
                .await
                .map_err(|e| anyhow!("Failed to set rate limit window: {}", e))?;
        }

        debug!(user_id = %user_id, channel = %channel, count, "Recorded notification attempt");

        Ok(())
    }

    pub async fn remaining_quota(&mut self, user_id: Uuid, channel: Channel) -> Result<u32, Error> {
        let key = Self::build_key(user_id, channel);
        let limit = self.config.rate_limit(channel);

        let current: Option<u32> = self
            .connection
            .get(&key)
            .await
            .map_err(|e| anyhow!("Failed to read rate limit counter: {}", e))?;

        Ok(limit.max_requests.saturating_sub(current.unwrap_or(0)))
    }

    /// Seconds until the current window expires, or -1 when no window is
    /// open for this key.
    pub async fn time_to_reset(&mut self, user_id: Uuid, channel: Channel) -> Result<i64, Error> {
        let key = Self::build_key(user_id, channel);

        let ttl: i64 = self
            .connection
            .ttl(&key)
            .await
            .map_err(|e| anyhow!("Failed to read rate limit ttl: {}", e))?;

        Ok(if ttl < 0 { -1 } else { ttl })
    }

    pub fn limit_for(&self, channel: Channel) -> RateLimitConfig {
        self.config.rate_limit(channel)
    }

    fn build_key(user_id: Uuid, channel: Channel) -> String {
        format!("{}{}:{}", RATE_LIMIT_KEY_PREFIX, channel.short_name(), user_id)
    }
}
