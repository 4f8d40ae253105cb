//! Business logic: token exchange, presence registry, delivery fan-out, and
//! the eviction sweep.

pub mod delivery;
pub mod presence;
pub mod reaper;
pub mod tokens;

pub use delivery::EventFanout;
pub use presence::PresenceRegistry;
pub use reaper::Reaper;
pub use tokens::{ConnectionIdentity, TokenExchange};
