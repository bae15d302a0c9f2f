//! History reconciliation.
//!
//! Keeps the platform navigation stack in step with the session store and
//! settles back/forward changes that race ahead of the network.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use pagewarp_client::FetchCoordinator;
use pagewarp_core::{HistoryEntry, Key, LinkAttributes, PagePatch, PageRecord, Route, SessionContext, VisitKind};

use crate::platform::Platform;
use crate::visit::{Acquired, Navigation, Visits};

pub struct HistoryReconciler {
    context: Arc<SessionContext>,
    coordinator: Arc<FetchCoordinator>,
    visits: Arc<Visits>,
    platform: Platform,
    /// The debounced change waiting for its window to pass.
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl HistoryReconciler {
    pub fn new(
        context: Arc<SessionContext>, coordinator: Arc<FetchCoordinator>, visits: Arc<Visits>, platform: Platform,
    ) -> Self {
        Self { context, coordinator, visits, platform, pending: Mutex::new(None) }
    }

    /// Push an entry for `page`. Writes nothing when the store has no record.
    pub fn push(&self, page: &PageRecord) -> bool {
        if !self.context.store().contains(&page.key) {
            tracing::error!(key = %page.key, "history push for unknown record");
            return false;
        }
        self.platform.history.push(&page.entry());
        tracing::trace!(key = %page.key, "history push");
        true
    }

    /// Replace the current entry with `page`. Writes nothing when the store
    /// has no record.
    pub fn replace(&self, page: &PageRecord) -> bool {
        if !self.context.store().contains(&page.key) {
            tracing::error!(key = %page.key, "history replace for unknown record");
            return false;
        }
        self.platform.history.replace(&page.entry());
        tracing::trace!(key = %page.key, "history replace");
        true
    }

    /// Align the landing page with the platform's current entry.
    ///
    /// A matching entry (e.g. after a hard reload) lends its predecessor and
    /// scroll position to the record; otherwise the entry is replaced.
    pub fn initialize(&self, page: &PageRecord) -> PageRecord {
        match self.platform.history.current() {
            Some(entry) if entry.key == page.key => {
                let patch = PagePatch {
                    rev: Some(entry.rev.clone()),
                    scroll: Some((entry.scroll_x, entry.scroll_y)),
                    ..Default::default()
                };
                self.platform.viewport.scroll_to(entry.scroll_x, entry.scroll_y);
                self.context.patch(&page.key, patch).unwrap_or_else(|| page.clone())
            }
            _ => {
                self.replace(page);
                page.clone()
            }
        }
    }

    /// Fetch `key` in the background so going back to it is instant.
    ///
    /// Skipped when `key` is `from` or already cached.
    pub fn reverse(&self, key: &Key, from: &Key) -> Option<JoinHandle<()>> {
        if key == from || self.context.has(key) {
            return None;
        }

        let route = Route { key: key.clone(), rev: from.clone(), kind: VisitKind::Reverse, attrs: Default::default() };
        let page = self.context.create(&route);
        let coordinator = Arc::clone(&self.coordinator);
        tracing::debug!(key = %key, "reverse fetch");
        Some(tokio::spawn(async move {
            if let Err(e) = coordinator.fetch(&page).await {
                tracing::debug!(key = %page.key, error = %e, "reverse fetch failed");
            }
        }))
    }

    /// Handle a back/forward signal.
    ///
    /// A cached destination renders immediately and returns the result.
    /// Otherwise the change is debounced and settled in the background;
    /// only the last change of a burst reaches the network.
    pub async fn on_history_change(self: &Arc<Self>, entry: HistoryEntry) -> Option<Navigation> {
        if self.context.has(&entry.key) {
            self.cancel_pending();
            self.reverse(&entry.rev, &entry.key);

            let page = self.context.find(&entry.key)?;
            tracing::debug!(key = %entry.key, "history change from cache");
            return Some(self.visits.navigate(&page, VisitKind::Popstate).await);
        }

        let debounce = self.context.config().pop_debounce();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            this.settle(entry).await;
        });

        if let Some(previous) = self.pending.lock().replace(task) {
            previous.abort();
            tracing::trace!("superseded pending history change");
        }
        None
    }

    /// Wait for the pending debounced change, if any.
    pub async fn settled(&self) {
        let task = self.pending.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Drop the pending debounced change. Returns `false` when there was none.
    pub fn cancel_pending(&self) -> bool {
        match self.pending.lock().take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    async fn settle(&self, entry: HistoryEntry) {
        tracing::debug!(key = %entry.key, "history change fetch");
        let attrs = LinkAttributes { targets: entry.targets.clone(), ..Default::default() };
        let route = Route { key: entry.key.clone(), rev: entry.rev.clone(), kind: VisitKind::Popstate, attrs };
        let page = self.context.create(&route);

        let (page, document) = match self.visits.acquire(&page).await {
            Acquired::Ready { page, document } => (page, document),
            Acquired::Failed(e) => {
                self.visits.fall_back(&entry.key, &e);
                return;
            }
            Acquired::Vetoed => {
                tracing::warn!(key = %entry.key, "history fetch vetoed; assigning location");
                self.platform.viewport.assign(&entry.key);
                return;
            }
            Acquired::Aborted => {
                tracing::debug!(key = %entry.key, "history fetch aborted");
                return;
            }
        };

        // time has passed; the user may have moved on
        let location = self.platform.history.location();
        if page.key == location {
            self.visits.render(&page, &document, VisitKind::Popstate).await;
        } else if let Some(current) = self.context.has(&location).then(|| self.context.find(&location)).flatten() {
            tracing::debug!(key = %location, stale = %page.key, "history moved on; rendering cached location");
            self.visits.navigate(&current, VisitKind::Popstate).await;
        } else {
            tracing::debug!(key = %location, stale = %page.key, "history moved on; fetching location");
            let route =
                Route { key: location, rev: page.key.clone(), kind: VisitKind::Popstate, attrs: Default::default() };
            let fresh = self.context.create(&route);
            self.visits.navigate(&fresh, VisitKind::Popstate).await;
        }
    }
}
