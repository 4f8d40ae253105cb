//! Data models for identifiers and room updates.

pub mod event;
pub mod ids;

pub use event::*;
pub use ids::*;
