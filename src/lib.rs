//! Redis-backed presence core for real-time chat rooms.
//!
//! Three cooperating pieces, all built on atomic compound operations
//! against a shared Redis so that any number of processes can serve the
//! same rooms without in-process locking:
//!
//! - [`TokenExchange`]: short-lived single-use tokens that hand a
//!   transport connection its authenticated identity.
//! - [`PresenceRegistry`]: per-room online map, per-handle liveness
//!   records, and typing indicators.
//! - [`EventFanout`]: room updates over Redis pub/sub, with a shared
//!   per-room subscription and a cancellable long-poll wait.
//!
//! [`Reaper`] sweeps rooms for handles that stopped pinging and announces
//! their timeouts; the `palaver-reaper` binary runs it on an interval.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use middleware::{mark_alive, ConnectionScope};
pub use models::{generate_handle_id, EventKind, RoomId, RoomUpdate, UserId, UserNumber};
pub use services::{ConnectionIdentity, EventFanout, PresenceRegistry, Reaper, TokenExchange};
pub use store::RedisStore;
