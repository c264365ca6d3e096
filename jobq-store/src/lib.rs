//! The shared key/value + sorted-set store contract (C3) and its backends.

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{Store, StoreOp};
