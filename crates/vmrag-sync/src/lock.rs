//! Per-collection exclusive locking (spec.md §5): every top-level sync
//! operation holds its collection's lock for the operation's full duration,
//! including any embedding calls it awaits, so two operations against the
//! same collection never interleave.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

/// Registry of per-collection locks, created lazily on first use.
#[derive(Default)]
pub struct CollectionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `collection`'s lock, blocking until any in-flight operation on
    /// the same collection releases it. The returned guard holds the lock
    /// until dropped; callers should keep it alive for the entire operation,
    /// including any `.await` on the embedding service.
    pub async fn acquire(&self, collection: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(collection.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        lock.lock_owned().await
    }

    /// Number of collections that currently have an entry in the registry
    /// (not necessarily locked — entries persist after release).
    pub async fn known_collections(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[allow(dead_code)]
fn assert_send_sync_guard(_g: &MutexGuard<'_, ()>) {}
