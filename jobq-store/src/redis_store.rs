//! Redis-backed [`Store`] implementation.
//!
//! This is the concrete "shared key/value + sorted-set store" the
//! specification gestures at without naming: `redis`'s native sorted sets
//! map directly onto `ZADD`/`ZPOPMAX`/`ZRANGEBYSCORE`/`ZCARD`, and `MULTI`
//! pipelines give the atomic batch `Store::pipeline` needs.
//!
//! # Score precision
//!
//! Redis scores are IEEE-754 doubles. This crate's internal score type is
//! `i128` (see `jobq_common::time`) so the `priority * 10^12 + time_ns`
//! encoding never loses precision in `jobq-queue` or `MemoryStore`. Only
//! this backend casts down to `f64` at its boundary — a deliberate,
//! bounded trade-off (see `DESIGN.md`), not silently reproduced elsewhere.
//! At real message rates the lost low bits of nanosecond resolution still
//! preserve FIFO-within-priority, per `spec.md`'s own "Score collision
//! risk" note.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::StoreError;
use crate::store::{Store, StoreOp};

/// A `Store` backed by a Redis (or Redis-compatible) server, using a
/// `ConnectionManager` for automatic reconnection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    /// Returns an error if the client cannot be constructed or the initial
    /// connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    #[allow(
        clippy::cast_precision_loss,
        reason = "Redis scores are f64; the i128->f64 cast is a documented, bounded trade-off"
    )]
    fn score_to_f64(score: i128) -> f64 {
        score as f64
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "round-tripping a Redis-returned f64 score back to i128"
    )]
    fn score_from_f64(score: f64) -> i128 {
        score as i128
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        if ttl.is_zero() {
            conn.set::<_, _, ()>(key, bytes)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        } else {
            conn.set_ex::<_, _, ()>(key, bytes, ttl.as_secs().max(1))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn zadd(&self, set: &str, member: &str, score: i128) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(set, member, Self::score_to_f64(score))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn zrem(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.zrem::<_, _, ()>(set, member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn zpopmax(&self, set: &str) -> Result<Option<(String, i128)>, StoreError> {
        let mut conn = self.conn.clone();
        let popped: Vec<(String, f64)> = conn
            .zpopmax(set, 1)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(popped
            .into_iter()
            .next()
            .map(|(member, score)| (member, Self::score_from_f64(score))))
    }

    async fn zrangebyscore(
        &self,
        set: &str,
        lo: i128,
        hi: i128,
        limit: usize,
    ) -> Result<Vec<(String, i128)>, StoreError> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, f64)> = conn
            .zrangebyscore_withscores_limit(
                set,
                Self::score_to_f64(lo),
                Self::score_to_f64(hi),
                0,
                limit as isize,
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|(member, score)| (member, Self::score_from_f64(score)))
            .collect())
    }

    async fn zcard(&self, set: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.zcard(set)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn pipeline(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                StoreOp::Put { key, bytes, ttl } => {
                    if ttl.is_zero() {
                        pipe.set(key, bytes);
                    } else {
                        pipe.set_ex(key, bytes, ttl.as_secs().max(1));
                    }
                }
                StoreOp::Del { key } => {
                    pipe.del(key);
                }
                StoreOp::Zadd { set, member, score } => {
                    pipe.zadd(set, member, Self::score_to_f64(score));
                }
                StoreOp::Zrem { set, member } => {
                    pipe.zrem(set, member);
                }
            }
        }
        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::Pipeline(e.to_string()))
    }
}
