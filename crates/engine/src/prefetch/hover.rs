use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use pagewarp_core::config::HoverTrigger as HoverMode;
use pagewarp_core::{Key, LinkElement, LinkRef, VisitKind};

use super::{Prefetched, Prefetcher, TriggerTimers};

/// Prefetches a link after the pointer rests on it.
pub struct HoverTrigger {
    prefetcher: Arc<Prefetcher>,
    timers: TriggerTimers,
    watched: Arc<Mutex<HashMap<Key, LinkElement>>>,
}

impl HoverTrigger {
    pub fn new(prefetcher: Arc<Prefetcher>, timers: TriggerTimers) -> Self {
        Self { prefetcher, timers, watched: Arc::default() }
    }

    /// Start watching eligible links. Returns how many are now watched.
    ///
    /// In `attribute` mode only links annotated for hover qualify; in `href`
    /// mode every link does unless it opts out. Links annotated for
    /// proximity or intersection belong to those triggers.
    pub fn watch(&self, links: impl IntoIterator<Item = LinkElement>) -> usize {
        let context = self.prefetcher.context();
        let config = context.config();
        if !config.hover.enabled {
            return 0;
        }

        let mut watched = self.watched.lock();
        for link in links {
            let attrs = &link.attrs;
            if attrs.disabled || attrs.proximity == Some(true) || attrs.intersect == Some(true) {
                continue;
            }
            let wanted = match config.hover.trigger {
                HoverMode::Attribute => attrs.hover == Some(true),
                HoverMode::Href => attrs.hover != Some(false),
            };
            if !wanted {
                continue;
            }
            let Ok(key) = context.key(&link) else { continue };
            if context.has(&key) {
                continue;
            }
            watched.insert(key, link);
        }

        tracing::debug!(watched = watched.len(), "hover watching");
        watched.len()
    }

    /// Pointer entered `link`. Returns `true` when a timer was scheduled.
    pub fn enter<'a>(&self, link: impl Into<LinkRef<'a>>) -> bool {
        let context = self.prefetcher.context();
        let Ok(key) = context.key(link) else { return false };
        let Some(link) = self.watched.lock().get(&key).cloned() else { return false };
        if !self.prefetcher.is_eligible(&key) {
            return false;
        }

        let delay = Duration::from_millis(link.attrs.threshold_ms.unwrap_or(context.config().hover.threshold_ms));
        let prefetcher = Arc::clone(&self.prefetcher);
        let watched = Arc::clone(&self.watched);
        let owned = key.clone();
        self.timers.schedule(key, delay, async move {
            match prefetcher.prefetch_settled(&link, VisitKind::Hover).await {
                Prefetched::Failed(_) | Prefetched::Aborted => {
                    tracing::debug!(key = %owned, "hover prefetch did not complete; still watching");
                }
                _ => {
                    watched.lock().remove(&owned);
                }
            }
        })
    }

    /// Pointer left `link` before the delay passed.
    pub fn leave<'a>(&self, link: impl Into<LinkRef<'a>>) -> bool {
        match self.prefetcher.context().key(link) {
            Ok(key) => self.timers.cancel(&key),
            Err(_) => false,
        }
    }

    pub fn unwatch(&self, key: &Key) -> bool {
        self.timers.cancel(key);
        self.watched.lock().remove(key).is_some()
    }

    pub fn is_watching(&self, key: &Key) -> bool {
        self.watched.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.watched.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop watching everything and drop pending timers.
    pub fn disconnect(&self) {
        let keys: Vec<Key> = self.watched.lock().drain().map(|(key, _)| key).collect();
        for key in &keys {
            self.timers.cancel(key);
        }
        tracing::debug!(count = keys.len(), "hover disconnected");
    }
}
