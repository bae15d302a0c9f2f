//! The public face of the engine.
//!
//! A [`Session`] wires the context, fetch coordinator, history reconciler,
//! prefetch triggers and visit state machine together. Surrounding code only
//! ever talks to a `Session`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use pagewarp_client::{FetchCoordinator, Fetched, Transport};
use pagewarp_core::{
    CacheMode, Decision, Error, Event, EventKind, HistoryEntry, Key, LinkAttributes, LinkElement, LinkRef,
    ListenerId, MemoryStats, Origin, PageRecord, Route, SessionConfig, SessionContext, VisitKind,
};

use crate::history::HistoryReconciler;
use crate::platform::Platform;
use crate::prefetch::{
    Candidate, HoverTrigger, IntersectTrigger, Prefetched, Prefetcher, ProximityTrigger, TriggerTimers,
};
use crate::render::Renderer;
use crate::visit::{Navigation, VisitState, Visits};

/// What [`Session::clear`] removes.
#[derive(Debug, Clone, PartialEq)]
pub enum Clear {
    All,
    Keys(Vec<Key>),
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub session: String,
    pub origin: String,
    pub current: Key,
    pub state: VisitState,
    pub pages: usize,
    pub cached: usize,
    pub cached_bytes: u64,
    pub in_flight: Vec<Key>,
    pub keys: Vec<Key>,
    pub memory: MemoryStats,
}

pub struct Session {
    context: Arc<SessionContext>,
    coordinator: Arc<FetchCoordinator>,
    visits: Arc<Visits>,
    history: Arc<HistoryReconciler>,
    prefetcher: Arc<Prefetcher>,
    timers: TriggerTimers,
    hover: HoverTrigger,
    proximity: ProximityTrigger,
    intersect: IntersectTrigger,
    platform: Platform,
    /// Reverse fetches and preloads started by the session itself.
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Build a session for `origin`.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration fails validation or the
    /// origin is not an http(s) URL.
    pub fn connect(
        origin: &str, config: SessionConfig, transport: Arc<dyn Transport>, platform: Platform,
    ) -> Result<Self, Error> {
        config.validate()?;
        let origin = Origin::parse(origin)?;

        let context = Arc::new(SessionContext::new(origin, config));
        let coordinator = Arc::new(FetchCoordinator::new(Arc::clone(&context), transport));
        let renderer = Arc::new(Renderer::new(Arc::clone(&context), platform.clone()));
        let visits =
            Arc::new(Visits::new(Arc::clone(&context), Arc::clone(&coordinator), renderer, platform.clone()));
        let history = Arc::new(HistoryReconciler::new(
            Arc::clone(&context),
            Arc::clone(&coordinator),
            Arc::clone(&visits),
            platform.clone(),
        ));
        let prefetcher = Arc::new(Prefetcher::new(Arc::clone(&context), Arc::clone(&coordinator)));
        let timers = TriggerTimers::new();

        tracing::info!(session = %context.id(), origin = %context.resolver().origin().url(), "session connected");
        Ok(Self {
            hover: HoverTrigger::new(Arc::clone(&prefetcher), timers.clone()),
            proximity: ProximityTrigger::new(Arc::clone(&prefetcher), timers.clone()),
            intersect: IntersectTrigger::new(Arc::clone(&prefetcher)),
            context,
            coordinator,
            visits,
            history,
            prefetcher,
            timers,
            platform,
            background: Mutex::new(Vec::new()),
        })
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` and keeps the old configuration when the new
    /// one fails validation.
    pub fn configure(&self, config: SessionConfig) -> Result<(), Error> {
        config.validate()?;
        self.context.configure(config);
        Ok(())
    }

    /// Record the document the platform loaded before the session took over.
    ///
    /// Stores it under the current location, aligns the history entry,
    /// starts a reverse fetch for the previous page and any configured
    /// preloads.
    pub fn initialize(&self, document: &str) -> PageRecord {
        let key = self.platform.history.location();
        let route = Route { key: key.clone(), rev: key, kind: VisitKind::Initial, attrs: LinkAttributes::default() };
        let page = self.context.create(&route);
        let page = self.context.commit(&page, document);
        self.context.set_current(page.key.clone());
        let page = self.history.initialize(&page);

        if let Some(task) = self.history.reverse(&page.rev, &page.key) {
            self.background.lock().push(task);
        }

        let paths = self.context.config().preload.paths_for(page.key.as_str());
        if !paths.is_empty() {
            let prefetcher = Arc::clone(&self.prefetcher);
            let task = tokio::spawn(async move {
                for path in &paths {
                    prefetcher.prefetch(path, VisitKind::Preload).await;
                }
            });
            self.background.lock().push(task);
        }

        self.context.emit(EventKind::Load, &page);
        tracing::info!(key = %page.key, title = %page.title, "session initialized");
        page
    }

    /// Navigate to `link` on behalf of the user.
    ///
    /// Emits a vetoable `visit` event, then behaves like [`Session::visit`].
    pub async fn trigger<'a>(&self, link: impl Into<LinkRef<'a>>) -> Navigation {
        self.navigate(link.into(), &LinkAttributes::default(), true).await
    }

    /// Navigate to `link` programmatically. `overrides` take precedence over
    /// the link's own attributes.
    pub async fn visit<'a>(&self, link: impl Into<LinkRef<'a>>, overrides: LinkAttributes) -> Navigation {
        self.navigate(link.into(), &overrides, false).await
    }

    async fn navigate(&self, link: LinkRef<'_>, overrides: &LinkAttributes, user: bool) -> Navigation {
        let attrs = link.attrs().map_or_else(|| overrides.clone(), |attrs| attrs.merge(overrides));
        let link = LinkElement::with_attrs(link.href(), attrs);

        self.visits.transition(VisitState::Resolving);
        let route = match self.context.route(&link, VisitKind::Visit) {
            Ok(route) => route,
            Err(reason) => {
                tracing::debug!(href = %link.href, %reason, "not navigable");
                self.visits.transition(VisitState::Idle);
                return Navigation::NotNavigable(reason);
            }
        };

        match route.attrs.cache {
            Some(CacheMode::Clear) => {
                tracing::debug!(key = %route.key, "clearing cache before visit");
                self.context.store().clear();
            }
            Some(CacheMode::Reset) => {
                self.context.store().remove(std::slice::from_ref(&route.key));
            }
            _ => {}
        }

        let page = self.context.create(&route);
        if user && self.context.emit(EventKind::Visit, &page).is_vetoed() {
            tracing::debug!(key = %page.key, "visit cancelled within dispatched event");
            self.visits.transition(VisitState::Idle);
            return Navigation::Vetoed;
        }

        let cancelled = self.coordinator.cancel_others(&page.key) + self.timers.cancel_all();
        self.history.cancel_pending();
        if cancelled > 0 {
            tracing::debug!(key = %page.key, cancelled, "cancelled speculative work");
        }

        self.visits.navigate(&page, VisitKind::Visit).await
    }

    /// Fetch `link` into the cache without rendering it.
    pub async fn prefetch<'a>(&self, link: impl Into<LinkRef<'a>>) -> Prefetched {
        self.prefetcher.prefetch(link, VisitKind::Prefetch).await
    }

    /// Fetch each path into the cache, one after another.
    pub async fn preload<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Vec<Prefetched> {
        let mut outcomes = Vec::new();
        for path in paths {
            outcomes.push(self.prefetcher.prefetch(path, VisitKind::Preload).await);
        }
        outcomes
    }

    /// Fetch the current page again, bypassing the cache, and render it.
    pub async fn reload(&self) -> Navigation {
        let key = self.context.current();
        let rev = self.context.find(&key).map_or_else(|| key.clone(), |page| page.rev);
        let route = Route { key: key.clone(), rev, kind: VisitKind::Reload, attrs: LinkAttributes::default() };
        let page = self.context.create(&route);

        self.visits.transition(VisitState::Fetching);
        let result = match self.coordinator.fetch(&page).await {
            Ok(Fetched::InTransit) => self.coordinator.join(&key).await.unwrap_or(Ok(Fetched::Aborted)),
            result => result,
        };

        match result {
            Ok(Fetched::Page { page, document }) => self.visits.render(&page, &document, VisitKind::Reload).await,
            Ok(Fetched::Vetoed) => {
                self.visits.transition(VisitState::Idle);
                Navigation::Vetoed
            }
            Ok(_) => {
                self.visits.transition(VisitState::Idle);
                Navigation::Aborted
            }
            Err(e) => self.visits.fall_back(&key, &e),
        }
    }

    /// Remove records. Returns how many were removed.
    pub fn clear(&self, what: Clear) -> usize {
        let mut store = self.context.store();
        let removed = match what {
            Clear::All => {
                let count = store.len();
                store.clear();
                count
            }
            Clear::Keys(keys) => store.remove(&keys),
        };
        tracing::debug!(removed, "cleared records");
        removed
    }

    /// Remove every record except the current page.
    pub fn purge(&self) -> usize {
        let current = self.context.current();
        self.context.store().purge(&[current])
    }

    pub fn current_page(&self) -> Option<PageRecord> {
        self.context.find(&self.context.current())
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event<'_>) -> Decision + Send + Sync + 'static,
    {
        self.context.events().on(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.context.events().off(id)
    }

    /// Handle a back/forward signal from the platform.
    pub async fn on_history_change(&self, entry: HistoryEntry) -> Option<Navigation> {
        self.history.on_history_change(entry).await
    }

    /// Watch `candidates` with every enabled speculative trigger.
    pub fn observe(&self, candidates: Vec<Candidate>) -> usize {
        let links = candidates.iter().map(|candidate| candidate.link.clone());
        let hovered = self.hover.watch(links);
        let near = self.proximity.connect(candidates.iter().cloned());
        let visible = self.intersect.observe(candidates);
        hovered + near + visible
    }

    pub fn hover(&self) -> &HoverTrigger {
        &self.hover
    }

    pub fn proximity(&self) -> &ProximityTrigger {
        &self.proximity
    }

    pub fn intersect(&self) -> &IntersectTrigger {
        &self.intersect
    }

    pub fn state(&self) -> VisitState {
        self.visits.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<VisitState> {
        self.visits.subscribe()
    }

    pub fn summary(&self) -> Summary {
        let (pages, cached, cached_bytes, keys) = {
            let store = self.context.store();
            (store.len(), store.cached_count(), store.total_bytes(), store.keys())
        };
        Summary {
            session: self.context.id().to_string(),
            origin: self.context.resolver().origin().url().to_string(),
            current: self.context.current(),
            state: self.visits.state(),
            pages,
            cached,
            cached_bytes,
            in_flight: self.coordinator.in_flight(),
            keys,
            memory: self.context.memory().stats(),
        }
    }

    /// Wait for background work the session started: the debounced history
    /// change, reverse fetches and preloads.
    pub async fn settled(&self) {
        self.history.settled().await;
        let tasks: Vec<_> = std::mem::take(&mut *self.background.lock());
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Tear everything down: triggers, timers, the pending history change,
    /// background tasks and every in-flight fetch.
    pub fn disconnect(&self) {
        self.hover.disconnect();
        self.proximity.disconnect();
        self.intersect.disconnect();
        self.timers.cancel_all();
        self.history.cancel_pending();
        for task in self.background.lock().drain(..) {
            task.abort();
        }
        let aborted = self.coordinator.cancel_all();
        tracing::info!(session = %self.context.id(), aborted, "session disconnected");
    }
}
