// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-key async locks.
//!
//! Operations on the same key (a tourist's cart, one execution...) are
//! linearized; different keys never contend. An entry lives only while some
//! task holds or waits for its lock.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Exclusive access to one key. Dropping it releases the lock and removes
/// the key's entry if nobody else is waiting.
pub struct KeyGuard {
    key: String,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // The guard holds a reference to the mutex; release it before counting
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Shared map of key -> lock. Cloning shares the map.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<LockMap>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn acquire(&self, key: impl Into<String>) -> KeyGuard {
        let key = key.into();
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        KeyGuard {
            key,
            locks: self.locks.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn cart_key(tourist_id: &str) -> String {
        format!("cart/{}", tourist_id)
    }

    pub fn tour_key(tourist_id: &str, tour_id: &str) -> String {
        format!("tour/{}/{}", tourist_id, tour_id)
    }

    pub fn execution_key(execution_id: &str) -> String {
        format!("execution/{}", execution_id)
    }
}
