//! Worker (C5) and pool/pool-manager (C6) for the jobq runtime.

pub(crate) mod duration_secs;
pub mod handler;
pub mod pool;
pub mod worker;

pub use handler::Handler;
pub use pool::{Pool, PoolConfig, PoolHandle, PoolManager, PoolStats};
pub use worker::{Worker, WorkerConfig, WorkerStatus};
