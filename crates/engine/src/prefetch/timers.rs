use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use pagewarp_core::Key;

/// Pending speculative timers, at most one per key.
///
/// Shared by the hover and proximity triggers so a key scheduled by one is
/// not scheduled again by the other.
#[derive(Debug, Clone, Default)]
pub struct TriggerTimers {
    pending: Arc<Mutex<HashMap<Key, (u64, JoinHandle<()>)>>>,
    next_id: Arc<AtomicU64>,
}

impl TriggerTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fire` after `delay` unless cancelled first.
    ///
    /// Returns `false` without scheduling when `key` already has a timer.
    pub fn schedule<F>(&self, key: Key, delay: Duration, fire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if pending.contains_key(&key) {
            return false;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.pending);
        let owned = key.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // the timer is spent once it fires; the fetch guards the key from here
            {
                let mut pending = registry.lock();
                if pending.get(&owned).is_some_and(|(current, _)| *current == id) {
                    pending.remove(&owned);
                }
            }
            fire.await;
        });

        tracing::trace!(key = %key, delay_ms = delay.as_millis() as u64, "timer scheduled");
        pending.insert(key, (id, task));
        true
    }

    /// Cancel the timer for `key`. No-op when none is pending.
    pub fn cancel(&self, key: &Key) -> bool {
        match self.pending.lock().remove(key) {
            Some((_, task)) => {
                task.abort();
                tracing::trace!(key = %key, "timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, (_, task)) in &drained {
            task.abort();
        }
        drained.len()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
