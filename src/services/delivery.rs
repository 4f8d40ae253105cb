//! Delivery fan-out: room updates over Redis pub/sub.
//!
//! Each room has a broadcast channel every attached transport hears, plus
//! one private channel per (room, user) for payloads only that user's
//! connections should see.

use crate::error::AppResult;
use crate::models::{RoomId, RoomUpdate, UserId};
use crate::store::{keys, RedisStore};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

/// Publishes room updates and feeds them back to local subscribers.
#[derive(Clone)]
pub struct EventFanout {
    store: Arc<RedisStore>,
    rooms: Arc<RwLock<HashMap<RoomId, (broadcast::Sender<String>, JoinHandle<()>)>>>,
}

impl EventFanout {
    pub fn new(store: Arc<RedisStore>) -> Self {
        Self {
            store,
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish an update to everyone attached to the room.
    #[instrument(skip(self, update))]
    pub async fn publish(&self, room_id: RoomId, update: &RoomUpdate) -> AppResult<u64> {
        let payload = serde_json::to_string(update)?;
        self.store
            .publish(&keys::room_channel(room_id), &payload)
            .await
    }

    /// Publish an update only to one user's connections in the room.
    #[instrument(skip(self, update))]
    pub async fn publish_to_user(
        &self,
        room_id: RoomId,
        user_id: UserId,
        update: &RoomUpdate,
    ) -> AppResult<u64> {
        let payload = serde_json::to_string(update)?;
        self.store
            .publish(&keys::user_channel(room_id, user_id), &payload)
            .await
    }

    /// Subscribe to a room's broadcast channel.
    ///
    /// The first local subscriber opens one dedicated Redis pub/sub
    /// connection for the room and forwards its messages into a broadcast
    /// channel; later subscribers share that connection.
    pub async fn subscribe(&self, room_id: RoomId) -> AppResult<broadcast::Receiver<String>> {
        let mut rooms = self.rooms.write().await;
        if let Some((tx, _)) = rooms.get(&room_id) {
            return Ok(tx.subscribe());
        }

        let pubsub = self.store.pubsub(&[keys::room_channel(room_id)]).await?;
        info!(room_id, "subscribed to room channel");

        let (tx, rx) = broadcast::channel(64);
        let mut stream = pubsub.into_on_message();
        let fwd = tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                if let Ok(payload) = msg.get_payload::<String>() {
                    let _ = fwd.send(payload);
                }
            }
        });

        rooms.insert(room_id, (tx, forwarder));
        Ok(rx)
    }

    /// Drop the room's shared subscription, stopping its forwarder and
    /// closing its pub/sub connection; the next `subscribe` reopens it.
    /// Receivers still held see the broadcast channel close.
    pub async fn unsubscribe(&self, room_id: RoomId) {
        let mut rooms = self.rooms.write().await;
        if let Some((_, forwarder)) = rooms.remove(&room_id) {
            forwarder.abort();
            debug!(room_id, "room channel dropped");
        }
    }

    /// Long-poll read: wait for the next update on the room's broadcast
    /// channel or the user's private channel, whichever arrives first.
    /// Returns `Ok(None)` when `wait` elapses with nothing published.
    ///
    /// Parks on its own pub/sub connection, so the wait holds no shared
    /// resource; callers must release pooled handles of their own before
    /// awaiting this.
    #[instrument(skip(self))]
    pub async fn next_update(
        &self,
        room_id: RoomId,
        user_id: UserId,
        wait: Duration,
    ) -> AppResult<Option<String>> {
        let channels = [
            keys::room_channel(room_id),
            keys::user_channel(room_id, user_id),
        ];
        let pubsub = self.store.pubsub(&channels).await?;
        let mut stream = pubsub.into_on_message();
        match tokio::time::timeout(wait, stream.next()).await {
            Ok(Some(msg)) => Ok(Some(msg.get_payload()?)),
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }
}
