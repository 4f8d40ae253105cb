//! Per-room presence: online map, liveness records, typing set.
//!
//! Every compound transition (join, ping, leave) runs as one Lua script or
//! one MULTI/EXEC pipeline, so concurrent callers never observe a
//! half-applied state and no in-process lock is needed even when handles
//! are served from different processes. Scripts reach liveness records by
//! concatenating a key prefix onto handles found in the online map, which
//! assumes a non-cluster deployment where scripts may touch keys outside
//! KEYS[].

use crate::error::{AppError, AppResult};
use crate::models::{RoomId, UserId, UserNumber};
use crate::store::{keys, RedisStore};
use chrono::Utc;
use redis::{AsyncCommands, Script};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// KEYS: online, liveness. ARGV: handle, ttl. 1 when the handle is still
/// registered and its liveness record was refreshed.
const PING_SCRIPT: &str = r#"
    local user_id = redis.call('HGET', KEYS[1], ARGV[1])
    if not user_id then return 0 end
    if redis.call('EXISTS', KEYS[2]) == 0 then return 0 end
    redis.call('EXPIRE', KEYS[2], ARGV[2])
    return 1
"#;

/// KEYS: online, typing. ARGV: user_id, user_number, liveness prefix.
/// Returns how many handles were removed.
const LEAVE_USER_SCRIPT: &str = r#"
    local removed = 0
    local entries = redis.call('HGETALL', KEYS[1])
    for i = 1, #entries, 2 do
        local handle = entries[i]
        local owner = entries[i + 1]
        if owner == ARGV[1] then
            redis.call('HDEL', KEYS[1], handle)
            redis.call('DEL', ARGV[3] .. handle)
            removed = removed + 1
        end
    end
    redis.call('SREM', KEYS[2], ARGV[2])
    return removed
"#;

/// KEYS: online. ARGV: liveness prefix. Returns a flat
/// {handle, user_id, ...} list of entries whose liveness record is gone.
const RECONCILE_SCRIPT: &str = r#"
    local entries = redis.call('HGETALL', KEYS[1])
    local stale = {}
    for i = 1, #entries, 2 do
        local handle = entries[i]
        local owner = entries[i + 1]
        if redis.call('EXISTS', ARGV[1] .. handle) == 0 then
            table.insert(stale, handle)
            table.insert(stale, owner)
        end
    end
    return stale
"#;

/// KEYS: online. ARGV: session_id, user_id, liveness prefix. The first
/// handle whose liveness record matches the session decides.
const SESSION_HAS_HANDLE_SCRIPT: &str = r#"
    local entries = redis.call('HGETALL', KEYS[1])
    for i = 1, #entries, 2 do
        local handle = entries[i]
        local owner = entries[i + 1]
        local session = redis.call('GET', ARGV[3] .. handle)
        if session == ARGV[1] then
            if owner == ARGV[2] then return 1 end
            return 0
        end
    end
    return 0
"#;

/// Race-safe source of truth for who is connected to a room, from which
/// handles, and who is typing.
#[derive(Clone)]
pub struct PresenceRegistry {
    store: Arc<RedisStore>,
    liveness_secs: u64,
}

impl PresenceRegistry {
    pub fn new(store: Arc<RedisStore>, liveness_ttl: Duration) -> Self {
        Self {
            store,
            liveness_secs: liveness_ttl.as_secs(),
        }
    }

    /// Register a handle in the room. One transaction: snapshot who is
    /// online, queue the user's last-seen sidecar event, add the handle to
    /// the online map, set its liveness record.
    ///
    /// Returns true iff the user was absent from the pre-update snapshot,
    /// i.e. exactly once per offline-to-online transition no matter how
    /// many handles they open. When several first-joins race, the first
    /// transaction Redis executes wins the true.
    #[instrument(skip(self, session_id))]
    pub async fn join(
        &self,
        room_id: RoomId,
        handle: &str,
        session_id: &str,
        user_id: UserId,
    ) -> AppResult<bool> {
        let meta = serde_json::json!({
            "last_online": Utc::now().timestamp().to_string(),
            "room_id": room_id,
        });

        let mut conn = self.store.connection();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hvals(keys::online(room_id));
        pipe.hset(keys::USERMETA_QUEUE, keys::usermeta_field(user_id), meta.to_string())
            .ignore();
        pipe.hset(keys::online(room_id), handle, user_id).ignore();
        pipe.set_ex(keys::liveness(room_id, handle), session_id, self.liveness_secs)
            .ignore();
        let (snapshot,): (Vec<UserId>,) = pipe.query_async(&mut conn).await?;

        let changed = !snapshot.contains(&user_id);
        if changed {
            info!(room_id, user_id, handle = %handle, "user online");
        } else {
            debug!(room_id, user_id, handle = %handle, "handle joined");
        }
        Ok(changed)
    }

    /// Refresh the handle's liveness record. Fails with `PingTimeout` when
    /// the handle's online-map entry or liveness record is gone; the caller
    /// must then drop the transport and rejoin, not retry.
    #[instrument(skip(self))]
    pub async fn ping(&self, room_id: RoomId, handle: &str) -> AppResult<()> {
        let mut conn = self.store.connection();
        let alive: i64 = Script::new(PING_SCRIPT)
            .key(keys::online(room_id))
            .key(keys::liveness(room_id, handle))
            .arg(handle)
            .arg(self.liveness_secs)
            .invoke_async(&mut conn)
            .await?;
        if alive == 0 {
            return Err(AppError::PingTimeout);
        }
        Ok(())
    }

    /// Remove one handle from the room. One transaction: read and drop the
    /// handle's online-map entry, drop its liveness record, drop the user
    /// number from the typing set when supplied, snapshot who remains.
    ///
    /// Returns true iff the owning user no longer appears among remaining
    /// online users, i.e. this was their last handle. Maintenance callers
    /// that cannot map a user id to its room-scoped number pass `None`;
    /// interactive disconnects always pass `Some`.
    #[instrument(skip(self))]
    pub async fn leave_handle(
        &self,
        room_id: RoomId,
        handle: &str,
        user_number: Option<UserNumber>,
    ) -> AppResult<bool> {
        let mut conn = self.store.connection();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hget(keys::online(room_id), handle);
        pipe.hdel(keys::online(room_id), handle).ignore();
        pipe.del(keys::liveness(room_id, handle)).ignore();
        if let Some(number) = user_number {
            pipe.srem(keys::typing(room_id), number).ignore();
        }
        pipe.hvals(keys::online(room_id));
        let (owner, remaining): (Option<UserId>, Vec<UserId>) =
            pipe.query_async(&mut conn).await?;

        let user_id = match owner {
            Some(id) => id,
            None => return Ok(false),
        };
        let offline = !remaining.contains(&user_id);
        if offline {
            info!(room_id, user_id, handle = %handle, "user offline");
        } else {
            debug!(room_id, user_id, handle = %handle, "handle left");
        }
        Ok(offline)
    }

    /// Remove every handle the user holds in the room, their liveness
    /// records, and the user's typing membership, as one atomic step.
    /// Returns true iff at least one handle was removed. For explicit quit
    /// actions that must close all of a user's connections.
    #[instrument(skip(self))]
    pub async fn leave_user(
        &self,
        room_id: RoomId,
        user_id: UserId,
        user_number: UserNumber,
    ) -> AppResult<bool> {
        let mut conn = self.store.connection();
        let removed: i64 = Script::new(LEAVE_USER_SCRIPT)
            .key(keys::online(room_id))
            .key(keys::typing(room_id))
            .arg(user_id)
            .arg(user_number)
            .arg(keys::liveness_prefix(room_id))
            .invoke_async(&mut conn)
            .await?;
        if removed > 0 {
            info!(room_id, user_id, removed, "user offline");
        }
        Ok(removed > 0)
    }

    /// User ids currently online in the room.
    pub async fn online_user_ids(&self, room_id: RoomId) -> AppResult<HashSet<UserId>> {
        let mut conn = self.store.connection();
        let ids: Vec<UserId> = conn.hvals(keys::online(room_id)).await?;
        Ok(ids.into_iter().collect())
    }

    /// Online user ids for many rooms in one round-trip, in input order.
    pub async fn multi_online_user_ids(
        &self,
        room_ids: &[RoomId],
    ) -> AppResult<Vec<HashSet<UserId>>> {
        if room_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.store.connection();
        let mut pipe = redis::pipe();
        for room_id in room_ids {
            pipe.hvals(keys::online(*room_id));
        }
        let per_room: Vec<Vec<UserId>> = pipe.query_async(&mut conn).await?;
        Ok(per_room
            .into_iter()
            .map(|ids| ids.into_iter().collect())
            .collect())
    }

    /// Mark the user number as typing. Returns whether membership changed.
    #[instrument(skip(self))]
    pub async fn start_typing(
        &self,
        room_id: RoomId,
        user_number: UserNumber,
    ) -> AppResult<bool> {
        let mut conn = self.store.connection();
        let added: i64 = conn.sadd(keys::typing(room_id), user_number).await?;
        Ok(added == 1)
    }

    /// Unmark the user number as typing. Returns whether membership changed.
    #[instrument(skip(self))]
    pub async fn stop_typing(&self, room_id: RoomId, user_number: UserNumber) -> AppResult<bool> {
        let mut conn = self.store.connection();
        let removed: i64 = conn.srem(keys::typing(room_id), user_number).await?;
        Ok(removed == 1)
    }

    /// User numbers currently typing in the room.
    pub async fn typing_user_numbers(&self, room_id: RoomId) -> AppResult<HashSet<UserNumber>> {
        let mut conn = self.store.connection();
        let numbers: Vec<UserNumber> = conn.smembers(keys::typing(room_id)).await?;
        Ok(numbers.into_iter().collect())
    }

    /// List (handle, user_id) entries whose liveness record has silently
    /// expired. Detection only; eviction is a separate `leave_handle` call,
    /// so reaping policy stays decoupled from detection.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, room_id: RoomId) -> AppResult<Vec<(String, UserId)>> {
        let mut conn = self.store.connection();
        let flat: Vec<String> = Script::new(RECONCILE_SCRIPT)
            .key(keys::online(room_id))
            .arg(keys::liveness_prefix(room_id))
            .invoke_async(&mut conn)
            .await?;

        let mut stale = Vec::with_capacity(flat.len() / 2);
        for pair in flat.chunks_exact(2) {
            let user_id = pair[1].parse().map_err(|_| {
                AppError::Internal(anyhow::anyhow!(
                    "non-numeric user id in online map: {}",
                    pair[1]
                ))
            })?;
            stale.push((pair[0].clone(), user_id));
        }
        Ok(stale)
    }

    /// Rooms whose online map is currently non-empty.
    #[instrument(skip(self))]
    pub async fn scan_active_rooms(&self) -> AppResult<Vec<RoomId>> {
        let mut conn = self.store.connection();
        let mut seen = HashSet::new();
        let mut rooms = Vec::new();
        let mut iter: redis::AsyncIter<'_, String> =
            conn.scan_match(keys::ACTIVE_ROOMS_PATTERN).await?;
        while let Some(key) = iter.next_item().await {
            if let Some(room_id) = keys::room_from_online(&key) {
                if seen.insert(room_id) {
                    rooms.push(room_id);
                }
            }
        }
        Ok(rooms)
    }

    /// Whether the session holds a live handle in the room owned by the
    /// given user. Lets callers answer "is this browsing session already
    /// connected here" without trusting the client.
    #[instrument(skip(self, session_id))]
    pub async fn session_has_open_handle(
        &self,
        room_id: RoomId,
        session_id: &str,
        user_id: UserId,
    ) -> AppResult<bool> {
        let mut conn = self.store.connection();
        let open: i64 = Script::new(SESSION_HAS_HANDLE_SCRIPT)
            .key(keys::online(room_id))
            .arg(session_id)
            .arg(user_id)
            .arg(keys::liveness_prefix(room_id))
            .invoke_async(&mut conn)
            .await?;
        Ok(open == 1)
    }
}
