//! Request-scoped composition wrapped around transport handlers.

pub mod alive;

pub use alive::{mark_alive, ConnectionScope};
