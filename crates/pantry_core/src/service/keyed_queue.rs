//! Per-key async lock queue.
//!
//! Mutations on the same `ItemKey` run one at a time in arrival order;
//! different keys do not contend. Entries are held as `Weak` references and
//! purged periodically once no guard keeps them alive.

use crate::model::key::ItemKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::OwnedMutexGuard;

/// Purge dead entries every N acquisitions.
const CLEANUP_INTERVAL: usize = 64;
/// Skip purging while the map is smaller than this.
const CLEANUP_THRESHOLD: usize = 128;

#[derive(Default)]
pub struct KeyedQueue {
    locks: Mutex<HashMap<ItemKey, Weak<tokio::sync::Mutex<()>>>>,
    acquire_counter: AtomicUsize,
}

/// Holds the locks of every key passed to `acquire_all` until dropped.
pub struct KeyedGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to every key in `keys`.
    ///
    /// Keys are deduplicated and locked in sorted order so two callers
    /// locking overlapping key sets cannot deadlock.
    pub async fn acquire_all(&self, keys: &[ItemKey]) -> KeyedGuard {
        let mut ordered: Vec<&ItemKey> = keys.iter().collect();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            let mutex = self.lock_for(key);
            guards.push(mutex.lock_owned().await);
        }
        KeyedGuard { _guards: guards }
    }

    fn lock_for(&self, key: &ItemKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let mutex = map.get(key).and_then(Weak::upgrade).unwrap_or_else(|| {
            let created = Arc::new(tokio::sync::Mutex::new(()));
            map.insert(key.clone(), Arc::downgrade(&created));
            created
        });

        let tick = self.acquire_counter.fetch_add(1, Ordering::Relaxed);
        if map.len() > CLEANUP_THRESHOLD && tick % CLEANUP_INTERVAL == 0 {
            map.retain(|_, weak| weak.strong_count() > 0);
        }
        mutex
    }

    #[cfg(test)]
    fn live_entries(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
