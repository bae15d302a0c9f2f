//! Shared state for one navigation session.
//!
//! A [`SessionContext`] is constructed explicitly and shared by `Arc`
//! between the fetch coordinator, the history reconciler and the prefetch
//! triggers. Several contexts can live in one process.

use parking_lot::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::events::{Dispatch, Event, EventBus, EventKind};
use crate::link::LinkRef;
use crate::location::{Key, NotNavigable, Origin, Resolver, Route};
use crate::memory::Memory;
use crate::page::{PagePatch, PageRecord, VisitKind};
use crate::store::SessionStore;

#[derive(Debug)]
pub struct SessionContext {
    id: String,
    resolver: Resolver,
    config: RwLock<SessionConfig>,
    store: Mutex<SessionStore>,
    events: EventBus,
    memory: Memory,
}

impl SessionContext {
    pub fn new(origin: Origin, config: SessionConfig) -> Self {
        let memory = Memory::new(config.cache_limit_mb);
        Self {
            id: Uuid::new_v4().to_string(),
            resolver: Resolver::new(origin),
            config: RwLock::new(config),
            store: Mutex::new(SessionStore::new()),
            events: EventBus::new(),
            memory,
        }
    }

    /// Session id sent with every request.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Replace the configuration and reset the download counters.
    pub fn configure(&self, config: SessionConfig) {
        self.memory.reset(config.cache_limit_mb);
        *self.config.write() = config;
        tracing::debug!(session = %self.id, "session reconfigured");
    }

    pub fn config(&self) -> SessionConfig {
        self.config.read().clone()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Lock the store. Never hold the guard across an `.await`.
    pub fn store(&self) -> MutexGuard<'_, SessionStore> {
        self.store.lock()
    }

    /// Key of the page currently shown, `/` before the first load.
    pub fn current(&self) -> Key {
        self.store.lock().current().cloned().unwrap_or_else(|| Key::from("/"))
    }

    pub fn set_current(&self, key: Key) {
        self.store.lock().set_current(key);
    }

    pub fn key<'a>(&self, link: impl Into<LinkRef<'a>>) -> Result<Key, NotNavigable> {
        self.resolver.key(link, &self.current())
    }

    pub fn route<'a>(&self, link: impl Into<LinkRef<'a>>, kind: VisitKind) -> Result<Route, NotNavigable> {
        self.resolver.route(link, &self.current(), kind)
    }

    pub fn create(&self, route: &Route) -> PageRecord {
        let config = self.config.read();
        self.store.lock().create(route, &config)
    }

    /// Record for `key` without treating absence as an error.
    pub fn find(&self, key: &Key) -> Option<PageRecord> {
        self.store.lock().find(key).cloned()
    }

    pub fn get(&self, key: &Key) -> Option<PageRecord> {
        self.store.lock().get(key)
    }

    pub fn has(&self, key: &Key) -> bool {
        self.store.lock().has(key)
    }

    pub fn patch(&self, key: &Key, patch: PagePatch) -> Option<PageRecord> {
        self.store.lock().patch(key, patch)
    }

    /// Emit an event for `page` on the session bus.
    pub fn emit(&self, kind: EventKind, page: &PageRecord) -> Dispatch {
        self.events.emit(Event::new(kind, page))
    }

    /// Commit a fetched document.
    ///
    /// Runs `before-cache` (which may veto the write or substitute the
    /// document), updates the record, writes the snapshot when caching
    /// applies, evicts down to the byte budget and emits `after-cache`.
    pub fn commit(&self, page: &PageRecord, document: &str) -> PageRecord {
        let (cache, limit) = {
            let config = self.config.read();
            (config.cache, config.cache_limit_bytes())
        };

        let mut write = cache && page.cacheable;
        let mut substitute = None;
        if write {
            match self.events.emit(Event::new(EventKind::BeforeCache, page).with_document(document)) {
                Dispatch::Proceed => {}
                Dispatch::Substituted(doc) => substitute = Some(doc),
                Dispatch::Vetoed => write = false,
            }
        }
        let document = substitute.as_deref().unwrap_or(document);

        let committed = {
            let mut store = self.store.lock();
            let committed = store.commit(page, document, write);
            if committed.cached
                && let Some(limit) = limit
            {
                store.evict(limit, &committed.page.key);
            }
            committed
        };

        if committed.cached {
            self.events.emit(Event::new(EventKind::AfterCache, &committed.page).with_document(document));
        }
        tracing::debug!(key = %committed.page.key, kind = %committed.page.kind, cached = committed.cached, "committed");
        committed.page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Decision;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context(config: SessionConfig) -> SessionContext {
        SessionContext::new(Origin::parse("https://example.com").unwrap(), config)
    }

    const ABOUT: &str = "<html><head><title>About</title></head><body>about</body></html>";

    #[test]
    fn test_route_uses_current_location() {
        let ctx = context(SessionConfig::default());
        ctx.set_current(Key::from("/docs/intro"));
        let route = ctx.route("guide", VisitKind::Visit).unwrap();
        assert_eq!(route.key, Key::from("/docs/guide"));
        assert_eq!(route.rev, Key::from("/docs/intro"));
    }

    #[test]
    fn test_commit_caches_and_emits_after_cache() {
        let ctx = context(SessionConfig::default());
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&fired);
        ctx.events().on(EventKind::AfterCache, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Decision::Continue
        });

        let page = ctx.create(&ctx.route("/about", VisitKind::Visit).unwrap());
        let committed = ctx.commit(&page, ABOUT);
        assert_eq!(committed.title, "About");
        assert!(ctx.has(&page.key));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_before_cache_veto_skips_snapshot() {
        let ctx = context(SessionConfig::default());
        ctx.events().on(EventKind::BeforeCache, |_| Decision::Veto);

        let page = ctx.create(&ctx.route("/about", VisitKind::Visit).unwrap());
        let committed = ctx.commit(&page, ABOUT);
        assert_eq!(committed.title, "About");
        assert!(!ctx.has(&page.key));
    }

    #[test]
    fn test_before_cache_substitution_is_stored() {
        let ctx = context(SessionConfig::default());
        ctx.events().on(EventKind::BeforeCache, |_| Decision::Substitute("<title>Swapped</title>".into()));

        let page = ctx.create(&ctx.route("/about", VisitKind::Visit).unwrap());
        let committed = ctx.commit(&page, ABOUT);
        assert_eq!(committed.title, "Swapped");
        assert_eq!(ctx.store().snapshot(&page.key).as_deref(), Some("<title>Swapped</title>"));
    }

    #[test]
    fn test_cache_disabled_never_writes() {
        let ctx = context(SessionConfig { cache: false, ..Default::default() });
        let page = ctx.create(&ctx.route("/about", VisitKind::Visit).unwrap());
        ctx.commit(&page, ABOUT);
        assert!(!ctx.has(&page.key));
        assert_eq!(ctx.find(&page.key).map(|p| p.title), Some("About".to_string()));
    }

    #[test]
    fn test_configure_resets_memory() {
        let ctx = context(SessionConfig::default());
        ctx.memory().record(512);
        ctx.configure(SessionConfig { cache_limit_mb: 1, ..Default::default() });
        assert_eq!(ctx.memory().stats().bytes, 0);
        assert_eq!(ctx.memory().stats().limit_mb, 1);
        assert_eq!(ctx.config().cache_limit_mb, 1);
    }
}
