//! Liveness interceptor composed around transport request handlers.
//!
//! Long-poll transports re-enter this on every request, so the `join` it
//! performs doubles as their liveness refresh. Socket transports pass
//! through once on connect and keep their record fresh with `ping`.

use crate::error::AppResult;
use crate::models::{RoomId, RoomUpdate, UserId};
use crate::services::{ConnectionIdentity, EventFanout, PresenceRegistry};
use std::future::Future;

/// Everything the presence layer needs to know about one request's
/// connection. Built by the transport layer, usually from a redeemed token.
#[derive(Debug, Clone)]
pub struct ConnectionScope {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub session_id: String,
    pub handle: String,
}

impl ConnectionScope {
    pub fn from_identity(identity: ConnectionIdentity, handle: String) -> Self {
        Self {
            room_id: identity.room_id,
            user_id: identity.user_id,
            session_id: identity.session_id,
            handle,
        }
    }
}

/// Register the connection as alive, announce the user if this brought them
/// online, then run `handler`.
///
/// `join_update` is only built and published when the join reported an
/// offline-to-online transition, so repeated calls for a live connection
/// announce nothing while still refreshing liveness.
pub async fn mark_alive<J, H, Fut, T>(
    registry: &PresenceRegistry,
    fanout: &EventFanout,
    scope: &ConnectionScope,
    join_update: J,
    handler: H,
) -> AppResult<T>
where
    J: FnOnce() -> RoomUpdate,
    H: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let newly_online = registry
        .join(scope.room_id, &scope.handle, &scope.session_id, scope.user_id)
        .await?;
    if newly_online {
        fanout.publish(scope.room_id, &join_update()).await?;
    }
    handler().await
}
