//! Connection token hand-off: mint, redeem, invalidate.
//!
//! The transport layer does no authentication of its own. An endpoint that
//! already authenticated the user mints a token here, the client presents
//! it when opening a transport connection, and redeeming it yields the
//! identity exactly once. Forward (token -> identity) and reverse
//! (identity -> token) records move in lockstep so each (user, room) pair
//! holds at most one live token.
//!
//! Scripts derive each record's partner key from prefix arguments, which
//! assumes a non-cluster deployment where scripts may touch keys outside
//! KEYS[].

use crate::error::{AppError, AppResult};
use crate::models::{RoomId, UserId};
use crate::store::{keys, RedisStore};
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// KEYS: forward, reverse. ARGV: user_id, room_id, session_id, ttl,
/// forward prefix, token.
const CREATE_SCRIPT: &str = r#"
    local existing = redis.call('GET', KEYS[2])
    if existing then
        redis.call('DEL', ARGV[5] .. existing)
    end
    redis.call('HSET', KEYS[1], 'user_id', ARGV[1], 'room_id', ARGV[2], 'session_id', ARGV[3])
    redis.call('EXPIRE', KEYS[1], ARGV[4])
    redis.call('SET', KEYS[2], ARGV[6], 'EX', ARGV[4])
"#;

/// KEYS: forward. ARGV: reverse prefix. Empty table when the token is gone.
const REDEEM_SCRIPT: &str = r#"
    local user_id = redis.call('HGET', KEYS[1], 'user_id')
    if not user_id then return {} end
    local room_id = redis.call('HGET', KEYS[1], 'room_id')
    local session_id = redis.call('HGET', KEYS[1], 'session_id')
    redis.call('DEL', KEYS[1], ARGV[1] .. user_id .. ':' .. room_id)
    return {user_id, room_id, session_id}
"#;

/// KEYS: reverse. ARGV: forward prefix. 1 when a token was dropped.
const INVALIDATE_SCRIPT: &str = r#"
    local token = redis.call('GET', KEYS[1])
    if not token then return 0 end
    redis.call('DEL', KEYS[1], ARGV[1] .. token)
    return 1
"#;

/// Identity a redeemed token hands to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionIdentity {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub session_id: String,
}

/// Single-use connection tokens bridging authentication to presence.
#[derive(Clone)]
pub struct TokenExchange {
    store: Arc<RedisStore>,
    ttl_secs: u64,
}

impl TokenExchange {
    pub fn new(store: Arc<RedisStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl_secs: ttl.as_secs(),
        }
    }

    /// Mint a token for the user in the room, displacing any token the pair
    /// already holds. The whole swap is one atomic step.
    #[instrument(skip(self, session_id))]
    pub async fn create(
        &self,
        user_id: UserId,
        room_id: RoomId,
        session_id: &str,
    ) -> AppResult<String> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.store.connection();
        let _: () = Script::new(CREATE_SCRIPT)
            .key(keys::token_forward(&token))
            .key(keys::token_reverse(user_id, room_id))
            .arg(user_id)
            .arg(room_id)
            .arg(session_id)
            .arg(self.ttl_secs)
            .arg(keys::TOKEN_FORWARD_PREFIX)
            .arg(&token)
            .invoke_async(&mut conn)
            .await?;
        debug!(user_id, room_id, "connection token created");
        Ok(token)
    }

    /// Redeem a token, destroying it. Exactly-once: a second call for the
    /// same token fails with `InvalidToken`, as does anything malformed,
    /// unknown, or expired. Malformed tokens are rejected before any store
    /// round-trip.
    #[instrument(skip(self, token))]
    pub async fn redeem(&self, token: &str) -> AppResult<ConnectionIdentity> {
        if !is_well_formed(token) {
            return Err(AppError::InvalidToken);
        }
        let mut conn = self.store.connection();
        let fields: Vec<String> = Script::new(REDEEM_SCRIPT)
            .key(keys::token_forward(token))
            .arg(keys::TOKEN_REVERSE_PREFIX)
            .invoke_async(&mut conn)
            .await?;
        match fields.as_slice() {
            [user_id, room_id, session_id] => {
                let identity = ConnectionIdentity {
                    user_id: parse_id(user_id)?,
                    room_id: parse_id(room_id)?,
                    session_id: session_id.clone(),
                };
                debug!(
                    user_id = identity.user_id,
                    room_id = identity.room_id,
                    "connection token redeemed"
                );
                Ok(identity)
            }
            _ => Err(AppError::InvalidToken),
        }
    }

    /// Drop the pair's outstanding token, if any. For bans and uninvites.
    /// Returns whether a token was actually dropped.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, user_id: UserId, room_id: RoomId) -> AppResult<bool> {
        let mut conn = self.store.connection();
        let dropped: i64 = Script::new(INVALIDATE_SCRIPT)
            .key(keys::token_reverse(user_id, room_id))
            .arg(keys::TOKEN_FORWARD_PREFIX)
            .invoke_async(&mut conn)
            .await?;
        if dropped == 1 {
            debug!(user_id, room_id, "connection token invalidated");
        }
        Ok(dropped == 1)
    }

    /// Sweep every room's token for the user. For deactivations and
    /// site-wide bans. Each pair is dropped atomically but the sweep as a
    /// whole is not; deletions are idempotent. Returns how many tokens
    /// were dropped.
    #[instrument(skip(self))]
    pub async fn invalidate_all(&self, user_id: UserId) -> AppResult<usize> {
        let mut conn = self.store.connection();
        let mut reverse_keys = Vec::new();
        {
            let mut iter: redis::AsyncIter<'_, String> = conn
                .scan_match(keys::token_reverse_pattern(user_id))
                .await?;
            while let Some(key) = iter.next_item().await {
                reverse_keys.push(key);
            }
        }

        let mut swept = 0;
        for key in reverse_keys {
            if let Some(room_id) = keys::room_from_reverse(&key, user_id) {
                if self.invalidate(user_id, room_id).await? {
                    swept += 1;
                }
            }
        }
        if swept > 0 {
            info!(user_id, swept, "invalidated all connection tokens");
        }
        Ok(swept)
    }
}

fn is_well_formed(token: &str) -> bool {
    Uuid::parse_str(token).is_ok()
}

fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse()
        .map_err(|_| AppError::Internal(anyhow::anyhow!("non-numeric id in token record: {}", raw)))
}
