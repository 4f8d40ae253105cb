//! Redis access: connection handling and key naming.

pub mod keys;
mod redis_store;

pub use redis_store::RedisStore;
