//! The shared key/value + sorted-set store contract (C3).
//!
//! The queue depends only on these abstract operations — modeled on, but
//! not specific to, a Redis-shaped sorted-set store. A `Store` is the only
//! mutable shared resource in the system; every compound state change the
//! queue makes (enqueue, dequeue, nack, dlq move, sweep-requeue) is issued
//! through [`Store::pipeline`] so no intermediate state is observable.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// A single write operation, batched into a [`Store::pipeline`] call.
///
/// Only write operations appear here: reads and pops return values the
/// caller must branch on before deciding the next write, so they are never
/// part of an atomic batch in this contract.
#[derive(Debug, Clone)]
pub enum StoreOp {
    Put {
        key: String,
        bytes: Vec<u8>,
        ttl: Duration,
    },
    Del {
        key: String,
    },
    Zadd {
        set: String,
        member: String,
        score: i128,
    },
    Zrem {
        set: String,
        member: String,
    },
}

/// Abstract operations a priority queue needs from its shared store.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Store `bytes` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Retrieve the value at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Insert or update `member`'s score in the ordered set `set`.
    async fn zadd(&self, set: &str, member: &str, score: i128) -> Result<(), StoreError>;

    /// Remove `member` from `set`. Removing an absent member is not an
    /// error.
    async fn zrem(&self, set: &str, member: &str) -> Result<(), StoreError>;

    /// Atomically remove and return the highest-scoring member of `set`,
    /// or `None` if the set is empty.
    async fn zpopmax(&self, set: &str) -> Result<Option<(String, i128)>, StoreError>;

    /// List members of `set` scored within `[lo, hi]`, ascending by score,
    /// capped at `limit` entries.
    async fn zrangebyscore(
        &self,
        set: &str,
        lo: i128,
        hi: i128,
        limit: usize,
    ) -> Result<Vec<(String, i128)>, StoreError>;

    /// Count of members in `set`.
    async fn zcard(&self, set: &str) -> Result<u64, StoreError>;

    /// Execute a batch of writes as a single atomic unit: either all of
    /// `ops` apply, or none do.
    async fn pipeline(&self, ops: Vec<StoreOp>) -> Result<(), StoreError>;
}
