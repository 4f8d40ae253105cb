//! Redis key and channel naming.
//!
//! Namespace:
//! - `token:forward:<token>`: hash {user_id, room_id, session_id}, token TTL
//! - `token:reverse:<user_id>:<room_id>`: token string, token TTL
//! - `room:<room_id>:online`: hash of handle -> user_id
//! - `room:<room_id>:online:<handle>`: session_id string, liveness TTL
//! - `room:<room_id>:typing`: set of user numbers
//! - `queue:usermeta`: hash of last-seen sidecar events for an external worker
//! - pub/sub: `channel:<room_id>` (room broadcast), `channel:<room_id>:<user_id>` (private)

use crate::models::{RoomId, UserId};

pub const TOKEN_FORWARD_PREFIX: &str = "token:forward:";
pub const TOKEN_REVERSE_PREFIX: &str = "token:reverse:";

/// SCAN pattern matching every room's online map.
pub const ACTIVE_ROOMS_PATTERN: &str = "room:*:online";

/// Hash of `{"last_online", "room_id"}` sidecar events keyed by [`usermeta_field`].
pub const USERMETA_QUEUE: &str = "queue:usermeta";

pub fn token_forward(token: &str) -> String {
    format!("{}{}", TOKEN_FORWARD_PREFIX, token)
}

pub fn token_reverse(user_id: UserId, room_id: RoomId) -> String {
    format!("{}{}:{}", TOKEN_REVERSE_PREFIX, user_id, room_id)
}

/// SCAN pattern matching every reverse record of one user.
pub fn token_reverse_pattern(user_id: UserId) -> String {
    format!("{}{}:*", TOKEN_REVERSE_PREFIX, user_id)
}

/// Room id encoded in a reverse-record key, if the key belongs to `user_id`.
pub fn room_from_reverse(key: &str, user_id: UserId) -> Option<RoomId> {
    let prefix = format!("{}{}:", TOKEN_REVERSE_PREFIX, user_id);
    key.strip_prefix(prefix.as_str())?.parse().ok()
}

pub fn online(room_id: RoomId) -> String {
    format!("room:{}:online", room_id)
}

pub fn liveness(room_id: RoomId, handle: &str) -> String {
    format!("room:{}:online:{}", room_id, handle)
}

/// Prefix scripts concatenate a handle onto to reach its liveness record.
pub fn liveness_prefix(room_id: RoomId) -> String {
    format!("room:{}:online:", room_id)
}

pub fn typing(room_id: RoomId) -> String {
    format!("room:{}:typing", room_id)
}

/// Room id encoded in an online-map key, as matched by [`ACTIVE_ROOMS_PATTERN`].
pub fn room_from_online(key: &str) -> Option<RoomId> {
    key.strip_prefix("room:")?
        .strip_suffix(":online")?
        .parse()
        .ok()
}

pub fn usermeta_field(user_id: UserId) -> String {
    format!("chatuser:{}", user_id)
}

pub fn room_channel(room_id: RoomId) -> String {
    format!("channel:{}", room_id)
}

pub fn user_channel(room_id: RoomId, user_id: UserId) -> String {
    format!("channel:{}:{}", room_id, user_id)
}
