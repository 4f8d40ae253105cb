//! Eviction sweep for handles whose liveness records lapsed.
//!
//! Transports that vanish without a clean disconnect leave their online-map
//! entries behind once their liveness records expire. The sweep walks the
//! active rooms, evicts such handles, and announces a timeout for each user
//! who thereby lost their last handle. The `palaver-reaper` binary runs it
//! on an interval.

use crate::error::AppResult;
use crate::models::{EventKind, RoomId, RoomUpdate};
use crate::services::{EventFanout, PresenceRegistry};
use serde_json::json;
use tracing::{info, instrument, warn};

/// Sweeps expired handles out of room online maps.
#[derive(Clone)]
pub struct Reaper {
    registry: PresenceRegistry,
    fanout: EventFanout,
}

impl Reaper {
    pub fn new(registry: PresenceRegistry, fanout: EventFanout) -> Self {
        Self { registry, fanout }
    }

    /// One pass over every active room. A room that fails mid-sweep is
    /// logged and skipped so the rest of the pass still runs.
    pub async fn sweep(&self) -> AppResult<()> {
        for room_id in self.registry.scan_active_rooms().await? {
            if let Err(e) = self.sweep_room(room_id).await {
                warn!(room_id, error = %e, "room sweep failed");
            }
        }
        Ok(())
    }

    /// Evict the room's expired handles and announce each user who thereby
    /// went offline, with the post-eviction userlist attached.
    #[instrument(skip(self))]
    pub async fn sweep_room(&self, room_id: RoomId) -> AppResult<()> {
        for (handle, user_id) in self.registry.reconcile(room_id).await? {
            let offline = self.registry.leave_handle(room_id, &handle, None).await?;
            info!(room_id, user_id, handle = %handle, "evicted expired handle");
            if offline {
                let users: Vec<_> = self
                    .registry
                    .online_user_ids(room_id)
                    .await?
                    .into_iter()
                    .map(|id| json!({ "user_id": id }))
                    .collect();
                let update = RoomUpdate::new(vec![json!({
                    "type": EventKind::Timeout,
                    "user_id": user_id,
                })])
                .with_users(users);
                self.fanout.publish(room_id, &update).await?;
            }
        }
        Ok(())
    }
}
