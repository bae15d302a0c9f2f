//! In-memory page and snapshot tables.
//!
//! Records are keyed by canonical [`Key`]; documents live in a separate
//! snapshot table keyed by [`SnapshotId`] so a record can exist (and be
//! fetched, hovered, scrolled) before its document has been written.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crate::config::SessionConfig;
use crate::document;
use crate::link::CacheMode;
use crate::location::{Key, Route};
use crate::page::{PagePatch, PageRecord, SnapshotId};

#[derive(Debug, Default)]
pub struct SessionStore {
    pages: HashMap<Key, PageRecord>,
    snapshots: HashMap<SnapshotId, Arc<str>>,
    /// Last access tick per key, for eviction.
    touched: HashMap<Key, u64>,
    tick: u64,
    current: Option<Key>,
}

/// Outcome of [`SessionStore::commit`].
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    pub page: PageRecord,
    /// Whether a snapshot was written.
    pub cached: bool,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record for `route`, or merge the route's overrides into the
    /// existing record for the same key.
    pub fn create(&mut self, route: &Route, config: &SessionConfig) -> PageRecord {
        let attrs = &route.attrs;

        if let Some(page) = self.pages.get_mut(&route.key) {
            if route.rev != route.key {
                page.rev = route.rev.clone();
            }
            page.kind = route.kind;
            if !attrs.targets.is_empty() {
                page.targets = attrs.targets.clone();
            }
            match attrs.cache {
                Some(CacheMode::Disabled) => page.cacheable = false,
                Some(CacheMode::Enabled) => page.cacheable = config.cache,
                _ => {}
            }
            if !page.cacheable && let Some(id) = page.snapshot.take() {
                tracing::debug!(key = %route.key, "record no longer cacheable; dropping snapshot");
                self.snapshots.remove(&id);
                page.cached_at = None;
            }
            if page.cacheable && page.snapshot.is_none() {
                page.snapshot = Some(SnapshotId::new());
            }
            if let Some(history) = attrs.history {
                page.history = history;
            }
            if let Some(delay) = attrs.threshold_ms {
                page.hover_delay_ms = delay;
                page.proximity_delay_ms = delay;
            }
            if let Some(distance) = attrs.proximity_distance {
                page.proximity_distance = distance;
            }
            if let Some(threshold) = attrs.progress_threshold_ms {
                page.progress_threshold_ms = threshold;
            }
            if let Some((x, y)) = attrs.scroll {
                page.scroll_x = x;
                page.scroll_y = y;
            }
            tracing::trace!(key = %route.key, kind = %route.kind, "merged into existing record");
            return page.clone();
        }

        let cacheable = config.cache && attrs.cache != Some(CacheMode::Disabled);
        let (scroll_x, scroll_y) = attrs.scroll.unwrap_or((0.0, 0.0));
        let progress = if config.progress.enabled { config.progress.threshold_ms } else { 0 };
        let page = PageRecord {
            key: route.key.clone(),
            rev: route.rev.clone(),
            snapshot: cacheable.then(SnapshotId::new),
            kind: route.kind,
            cacheable,
            history: attrs.history.unwrap_or(true),
            targets: if attrs.targets.is_empty() { config.targets.clone() } else { attrs.targets.clone() },
            scroll_x,
            scroll_y,
            visits: 0,
            title: String::new(),
            hover_delay_ms: attrs.threshold_ms.unwrap_or(config.hover.threshold_ms),
            proximity_distance: attrs.proximity_distance.unwrap_or(config.proximity.distance),
            proximity_delay_ms: attrs.threshold_ms.unwrap_or(config.proximity.threshold_ms),
            progress_threshold_ms: attrs.progress_threshold_ms.unwrap_or(progress),
            created_at: Utc::now(),
            cached_at: None,
        };

        tracing::trace!(key = %page.key, kind = %page.kind, cacheable, "created record");
        self.pages.insert(page.key.clone(), page.clone());
        page
    }

    /// Record a fetched document for `page`.
    ///
    /// The title is always extracted and prefetch-family kinds are stored as
    /// `prefetch`. The snapshot is only written when `write` is set and the
    /// record is cacheable.
    pub fn commit(&mut self, page: &PageRecord, document: &str, write: bool) -> Committed {
        let stored = self.pages.entry(page.key.clone()).or_insert_with(|| {
            tracing::debug!(key = %page.key, "record vanished while in flight; restoring");
            page.clone()
        });

        stored.kind = page.kind.normalized();
        stored.title = document::title(document);

        let cached = write && stored.cacheable;
        if cached {
            let id = *stored.snapshot.get_or_insert_with(SnapshotId::new);
            stored.cached_at = Some(Utc::now());
            self.snapshots.insert(id, Arc::from(document));
        }

        let page = stored.clone();
        if cached {
            self.touch(&page.key);
        }
        Committed { page, cached }
    }

    /// Shallow merge of `patch` into the record for `key`.
    pub fn patch(&mut self, key: &Key, patch: PagePatch) -> Option<PageRecord> {
        let Some(page) = self.pages.get_mut(key) else {
            tracing::error!(key = %key, "cannot patch: no record");
            return None;
        };

        if let Some(rev) = patch.rev {
            page.rev = rev;
        }
        if let Some(kind) = patch.kind {
            page.kind = kind;
        }
        if let Some(cacheable) = patch.cacheable {
            page.cacheable = cacheable;
            if !cacheable && let Some(id) = page.snapshot.take() {
                self.snapshots.remove(&id);
                page.cached_at = None;
            }
        }
        if let Some(history) = patch.history {
            page.history = history;
        }
        if let Some(targets) = patch.targets {
            page.targets = targets;
        }
        if let Some((x, y)) = patch.scroll {
            page.scroll_x = x;
            page.scroll_y = y;
        }
        if let Some(title) = patch.title {
            page.title = title;
        }

        let mut wrote = false;
        if let Some(document) = patch.document {
            page.title = document::title(&document);
            if page.cacheable {
                let id = *page.snapshot.get_or_insert_with(SnapshotId::new);
                page.cached_at = Some(Utc::now());
                self.snapshots.insert(id, Arc::from(document));
                wrote = true;
            }
        }

        let page = page.clone();
        if wrote {
            self.touch(key);
        }
        Some(page)
    }

    /// The record exists, owns a snapshot, and that snapshot is non-empty.
    pub fn has(&self, key: &Key) -> bool {
        self.pages
            .get(key)
            .and_then(|page| page.snapshot)
            .and_then(|id| self.snapshots.get(&id))
            .is_some_and(|doc| !doc.is_empty())
    }

    /// Whether any record exists for `key`, cached or not.
    pub fn contains(&self, key: &Key) -> bool {
        self.pages.contains_key(key)
    }

    /// Record for `key`. A missing record is a consistency error.
    pub fn get(&self, key: &Key) -> Option<PageRecord> {
        match self.pages.get(key) {
            Some(page) => Some(page.clone()),
            None => {
                tracing::error!(key = %key, "no page record");
                None
            }
        }
    }

    /// Record for `key` without logging when absent.
    pub fn find(&self, key: &Key) -> Option<&PageRecord> {
        self.pages.get(key)
    }

    /// Cached document for `key`, marking it recently used.
    pub fn snapshot(&mut self, key: &Key) -> Option<Arc<str>> {
        let Some(page) = self.pages.get(key) else {
            tracing::error!(key = %key, "no page record for snapshot");
            return None;
        };
        let Some(document) = page.snapshot.and_then(|id| self.snapshots.get(&id)).cloned() else {
            tracing::error!(key = %key, "page record has no snapshot");
            return None;
        };
        self.touch(key);
        Some(document)
    }

    /// Delete every record not listed in `keep`. Returns how many were removed.
    pub fn purge(&mut self, keep: &[Key]) -> usize {
        let keep: HashSet<&Key> = keep.iter().collect();
        let doomed: Vec<Key> = self.pages.keys().filter(|key| !keep.contains(key)).cloned().collect();
        self.remove(&doomed)
    }

    /// Delete the listed records and their snapshots. Absent keys are ignored.
    pub fn remove(&mut self, keys: &[Key]) -> usize {
        let mut removed = 0;
        for key in keys {
            if let Some(page) = self.pages.remove(key) {
                if let Some(id) = page.snapshot {
                    self.snapshots.remove(&id);
                }
                self.touched.remove(key);
                removed += 1;
            }
        }
        removed
    }

    /// Delete every record and snapshot.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.snapshots.clear();
        self.touched.clear();
    }

    /// Evict least-recently-used snapshots until the total fits `limit` bytes.
    ///
    /// The current page and `keep` are never evicted.
    pub fn evict(&mut self, limit: u64, keep: &Key) -> Vec<Key> {
        let mut evicted = Vec::new();
        let mut total = self.total_bytes();

        while total > limit {
            let victim = self
                .pages
                .values()
                .filter(|page| &page.key != keep && Some(&page.key) != self.current.as_ref())
                .filter_map(|page| {
                    let bytes = page.snapshot.and_then(|id| self.snapshots.get(&id)).map(|doc| doc.len())?;
                    Some((self.touched.get(&page.key).copied().unwrap_or(0), bytes, page.key.clone()))
                })
                .min_by_key(|(tick, _, _)| *tick);

            let Some((_, bytes, key)) = victim else { break };
            self.remove(std::slice::from_ref(&key));
            total = total.saturating_sub(bytes as u64);
            tracing::debug!(key = %key, bytes, total, limit, "evicted snapshot");
            evicted.push(key);
        }

        evicted
    }

    pub fn total_bytes(&self) -> u64 {
        self.snapshots.values().map(|doc| doc.len() as u64).sum()
    }

    /// Count a render of `key` and make it the current page.
    pub fn visited(&mut self, key: &Key) -> Option<PageRecord> {
        let Some(page) = self.pages.get_mut(key) else {
            tracing::error!(key = %key, "cannot mark visited: no record");
            return None;
        };
        page.visits += 1;
        let page = page.clone();
        self.set_current(key.clone());
        Some(page)
    }

    pub fn set_current(&mut self, key: Key) {
        self.touch(&key);
        self.current = Some(key);
    }

    pub fn current(&self) -> Option<&Key> {
        self.current.as_ref()
    }

    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.pages.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Number of records that own a stored document.
    pub fn cached_count(&self) -> usize {
        self.pages.keys().filter(|key| self.has(key)).count()
    }

    fn touch(&mut self, key: &Key) {
        self.tick += 1;
        self.touched.insert(key.clone(), self.tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkAttributes;
    use crate::page::VisitKind;

    fn route(key: &str, kind: VisitKind) -> Route {
        Route { key: Key::from(key), rev: Key::from("/"), kind, attrs: LinkAttributes::default() }
    }

    fn doc(title: &str) -> String {
        format!("<html><head><title>{title}</title></head><body><main>{title}</main></body></html>")
    }

    #[test]
    fn test_create_fills_from_config() {
        let mut store = SessionStore::new();
        let config = SessionConfig::default();
        let page = store.create(&route("/about", VisitKind::Visit), &config);

        assert_eq!(page.targets, vec!["body".to_string()]);
        assert!(page.cacheable);
        assert!(page.snapshot.is_some());
        assert_eq!(page.hover_delay_ms, 250);
        assert_eq!(page.proximity_distance, 75.0);
        assert!(!store.has(&page.key));
    }

    #[test]
    fn test_create_merges_existing_key() {
        let mut store = SessionStore::new();
        let config = SessionConfig::default();
        let first = store.create(&route("/about", VisitKind::Hover), &config);

        let mut again = route("/about", VisitKind::Visit);
        again.rev = Key::from("/docs");
        again.attrs.targets = vec!["main".into()];
        let merged = store.create(&again, &config);

        assert_eq!(store.len(), 1);
        assert_eq!(merged.snapshot, first.snapshot);
        assert_eq!(merged.created_at, first.created_at);
        assert_eq!(merged.rev, Key::from("/docs"));
        assert_eq!(merged.kind, VisitKind::Visit);
        assert_eq!(merged.targets, vec!["main".to_string()]);
    }

    #[test]
    fn test_create_cache_disabled() {
        let mut store = SessionStore::new();
        let config = SessionConfig { cache: false, ..Default::default() };
        let page = store.create(&route("/a", VisitKind::Visit), &config);
        assert!(!page.cacheable);
        assert_eq!(page.snapshot, None);

        let mut link = route("/b", VisitKind::Visit);
        link.attrs.cache = Some(CacheMode::Disabled);
        let page = store.create(&link, &SessionConfig::default());
        assert!(!page.cacheable);
    }

    #[test]
    fn test_progress_threshold_follows_config() {
        let mut store = SessionStore::new();
        let mut config = SessionConfig::default();
        assert_eq!(store.create(&route("/a", VisitKind::Visit), &config).progress_threshold_ms, 500);

        config.progress.enabled = false;
        assert_eq!(store.create(&route("/b", VisitKind::Visit), &config).progress_threshold_ms, 0);

        let mut link = route("/c", VisitKind::Visit);
        link.attrs.progress_threshold_ms = Some(120);
        assert_eq!(store.create(&link, &config).progress_threshold_ms, 120);
    }

    #[test]
    fn test_disabling_cache_drops_existing_snapshot() {
        let mut store = SessionStore::new();
        let page = store.create(&route("/a", VisitKind::Visit), &SessionConfig::default());
        store.commit(&page, &doc("A"), true);
        assert!(store.has(&page.key));

        let mut link = route("/a", VisitKind::Visit);
        link.attrs.cache = Some(CacheMode::Disabled);
        let merged = store.create(&link, &SessionConfig::default());

        assert!(!merged.cacheable);
        assert_eq!(merged.snapshot, None);
        assert_eq!(merged.cached_at, None);
        assert!(!store.has(&page.key));
        assert_eq!(store.total_bytes(), 0);

        let patched = store.patch(&page.key, PagePatch { document: Some(doc("B")), ..Default::default() }).unwrap();
        assert_eq!(patched.title, "B");
        assert!(!store.has(&page.key));
    }

    #[test]
    fn test_commit_writes_snapshot_and_title() {
        let mut store = SessionStore::new();
        let page = store.create(&route("/about", VisitKind::Hover), &SessionConfig::default());
        let committed = store.commit(&page, &doc("About"), true);

        assert!(committed.cached);
        assert_eq!(committed.page.title, "About");
        assert_eq!(committed.page.kind, VisitKind::Prefetch);
        assert!(committed.page.cached_at.is_some());
        assert!(store.has(&page.key));
        assert_eq!(store.snapshot(&page.key).as_deref(), Some(doc("About").as_str()));
    }

    #[test]
    fn test_commit_without_write_keeps_record_uncached() {
        let mut store = SessionStore::new();
        let page = store.create(&route("/about", VisitKind::Visit), &SessionConfig::default());
        let committed = store.commit(&page, &doc("About"), false);

        assert!(!committed.cached);
        assert_eq!(committed.page.title, "About");
        assert!(!store.has(&page.key));
    }

    #[test]
    fn test_has_requires_non_empty_snapshot() {
        let mut store = SessionStore::new();
        let page = store.create(&route("/empty", VisitKind::Visit), &SessionConfig::default());
        store.commit(&page, "", true);
        assert!(!store.has(&page.key));
        assert!(!store.has(&Key::from("/missing")));
    }

    #[test]
    fn test_patch_merges_and_replaces_document() {
        let mut store = SessionStore::new();
        let page = store.create(&route("/a", VisitKind::Visit), &SessionConfig::default());
        store.commit(&page, &doc("Old"), true);

        let patched = store
            .patch(&page.key, PagePatch { scroll: Some((0.0, 40.0)), document: Some(doc("New")), ..Default::default() })
            .unwrap();
        assert_eq!(patched.scroll_y, 40.0);
        assert_eq!(patched.title, "New");
        assert!(store.snapshot(&page.key).unwrap().contains("New"));

        assert_eq!(store.patch(&Key::from("/none"), PagePatch::scroll(1.0, 1.0)), None);
    }

    #[test]
    fn test_missing_lookups_return_none() {
        let mut store = SessionStore::new();
        assert_eq!(store.get(&Key::from("/x")), None);
        assert_eq!(store.snapshot(&Key::from("/x")), None);

        let page = store.create(&route("/y", VisitKind::Visit), &SessionConfig::default());
        assert_eq!(store.snapshot(&page.key), None);
    }

    #[test]
    fn test_purge_keeps_listed_keys() {
        let mut store = SessionStore::new();
        let config = SessionConfig::default();
        for key in ["/a", "/b", "/c"] {
            let page = store.create(&route(key, VisitKind::Visit), &config);
            store.commit(&page, &doc(key), true);
        }

        let removed = store.purge(&[Key::from("/b")]);
        assert_eq!(removed, 2);
        assert_eq!(store.keys(), vec![Key::from("/b")]);
        assert_eq!(store.total_bytes(), doc("/b").len() as u64);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = SessionStore::new();
        let config = SessionConfig::default();
        for key in ["/a", "/b"] {
            let page = store.create(&route(key, VisitKind::Visit), &config);
            store.commit(&page, &doc(key), true);
        }

        assert_eq!(store.remove(&[Key::from("/a"), Key::from("/zzz")]), 1);
        assert!(!store.has(&Key::from("/a")));

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.total_bytes(), 0);
    }

    #[test]
    fn test_evict_least_recently_used() {
        let mut store = SessionStore::new();
        let config = SessionConfig::default();
        let body = "x".repeat(100);
        for key in ["/a", "/b", "/c", "/d"] {
            let page = store.create(&route(key, VisitKind::Visit), &config);
            store.commit(&page, &body, true);
        }
        store.set_current(Key::from("/a"));
        // /b was used more recently than /c
        store.snapshot(&Key::from("/b"));

        let evicted = store.evict(250, &Key::from("/d"));
        assert_eq!(evicted, vec![Key::from("/c"), Key::from("/b")]);
        assert!(store.has(&Key::from("/a")));
        assert!(store.has(&Key::from("/d")));
    }

    #[test]
    fn test_visited_bumps_and_sets_current() {
        let mut store = SessionStore::new();
        let page = store.create(&route("/a", VisitKind::Visit), &SessionConfig::default());
        assert_eq!(store.visited(&page.key).map(|p| p.visits), Some(1));
        assert_eq!(store.visited(&page.key).map(|p| p.visits), Some(2));
        assert_eq!(store.current(), Some(&page.key));
        assert_eq!(store.visited(&Key::from("/none")), None);
    }

    #[test]
    fn test_evict_stops_when_only_protected_remain() {
        let mut store = SessionStore::new();
        let page = store.create(&route("/big", VisitKind::Visit), &SessionConfig::default());
        store.commit(&page, &"x".repeat(1000), true);

        assert!(store.evict(10, &page.key).is_empty());
        assert!(store.has(&page.key));
    }
}
