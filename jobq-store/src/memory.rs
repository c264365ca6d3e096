//! In-process [`Store`] implementation.
//!
//! Backed by `RwLock`-guarded `HashMap`s: O(1) point operations, O(n log n)
//! sort-on-read for the ordered-set range/pop operations. Intended for
//! tests and single-node deployments; production multi-node deployments
//! should use [`crate::redis_store::RedisStore`].

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{Store, StoreOp};

struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// In-memory [`Store`]. Cheap to clone — the underlying maps are shared via
/// an `Arc` held inside the `RwLock` wrapper itself is not needed since the
/// store is always used behind an `Arc<dyn Store>` at the call site.
#[derive(Debug, Default)]
pub struct MemoryStore {
    kv: RwLock<HashMap<String, Entry>>,
    zsets: RwLock<HashMap<String, HashMap<String, i128>>>,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("len", &self.bytes.len())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            kv: RwLock::new(HashMap::new()),
            zsets: RwLock::new(HashMap::new()),
        }
    }

    fn apply_op(&self, op: StoreOp) {
        match op {
            StoreOp::Put { key, bytes, ttl } => {
                self.put_sync(&key, bytes, ttl);
            }
            StoreOp::Del { key } => {
                self.kv
                    .write()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .remove(&key);
            }
            StoreOp::Zadd { set, member, score } => {
                self.zadd_sync(&set, &member, score);
            }
            StoreOp::Zrem { set, member } => {
                self.zrem_sync(&set, &member);
            }
        }
    }

    fn put_sync(&self, key: &str, bytes: Vec<u8>, ttl: Duration) {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        self.kv
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                key.to_string(),
                Entry {
                    bytes,
                    expires_at,
                },
            );
    }

    fn zadd_sync(&self, set: &str, member: &str, score: i128) {
        self.zsets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string(), score);
    }

    fn zrem_sync(&self, set: &str, member: &str) {
        if let Some(members) = self
            .zsets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(set)
        {
            members.remove(member);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.put_sync(key, bytes, ttl);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self
            .kv
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(guard
            .get(key)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.bytes.clone()))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.kv
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    async fn zadd(&self, set: &str, member: &str, score: i128) -> Result<(), StoreError> {
        self.zadd_sync(set, member, score);
        Ok(())
    }

    async fn zrem(&self, set: &str, member: &str) -> Result<(), StoreError> {
        self.zrem_sync(set, member);
        Ok(())
    }

    async fn zpopmax(&self, set: &str) -> Result<Option<(String, i128)>, StoreError> {
        let mut guard = self
            .zsets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(members) = guard.get_mut(set) else {
            return Ok(None);
        };
        let top = members
            .iter()
            .max_by_key(|(_, score)| **score)
            .map(|(member, score)| (member.clone(), *score));
        if let Some((member, _)) = &top {
            members.remove(member);
        }
        Ok(top)
    }

    async fn zrangebyscore(
        &self,
        set: &str,
        lo: i128,
        hi: i128,
        limit: usize,
    ) -> Result<Vec<(String, i128)>, StoreError> {
        let guard = self
            .zsets
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(members) = guard.get(set) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<_> = members
            .iter()
            .filter(|(_, score)| **score >= lo && **score <= hi)
            .map(|(member, score)| (member.clone(), *score))
            .collect();
        entries.sort_by_key(|(_, score)| *score);
        entries.truncate(limit);
        Ok(entries)
    }

    async fn zcard(&self, set: &str) -> Result<u64, StoreError> {
        let guard = self
            .zsets
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(guard.get(set).map_or(0, |m| m.len() as u64))
    }

    async fn pipeline(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        for op in ops {
            self.apply_op(op);
        }
        Ok(())
    }
}
