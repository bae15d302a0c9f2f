//! Shared wiring for unit tests.

use std::sync::Arc;

use pagewarp_client::{FetchCoordinator, MemoryTransport};
use pagewarp_core::{HistoryEntry, Key, Origin, PageRecord, SessionConfig, SessionContext, VisitKind};

use crate::headless::Headless;
use crate::history::HistoryReconciler;
use crate::prefetch::{HoverTrigger, IntersectTrigger, Prefetcher, ProximityTrigger, TriggerTimers};
use crate::render::Renderer;
use crate::visit::Visits;

pub(crate) fn doc(key: &str) -> String {
    format!("<html><head><title>{key}</title></head><body><main>{key}</main></body></html>")
}

pub(crate) struct Fixture {
    pub context: Arc<SessionContext>,
    pub transport: Arc<MemoryTransport>,
    pub coordinator: Arc<FetchCoordinator>,
    pub headless: Headless,
    pub history: Arc<HistoryReconciler>,
    pub prefetcher: Arc<Prefetcher>,
    pub timers: TriggerTimers,
}

impl Fixture {
    pub fn new(location: &str) -> Self {
        let origin = Origin::parse("https://example.com").unwrap();
        let context = Arc::new(SessionContext::new(origin, SessionConfig::default()));
        let transport = Arc::new(MemoryTransport::new());
        let coordinator = Arc::new(FetchCoordinator::new(Arc::clone(&context), transport.clone()));
        let headless = Headless::new(location);
        let renderer = Arc::new(Renderer::new(Arc::clone(&context), headless.platform()));
        let visits =
            Arc::new(Visits::new(Arc::clone(&context), Arc::clone(&coordinator), renderer, headless.platform()));
        let history = Arc::new(HistoryReconciler::new(
            Arc::clone(&context),
            Arc::clone(&coordinator),
            visits,
            headless.platform(),
        ));
        let prefetcher = Arc::new(Prefetcher::new(Arc::clone(&context), Arc::clone(&coordinator)));
        Self { context, transport, coordinator, headless, history, prefetcher, timers: TriggerTimers::new() }
    }

    /// Commit `doc(key)` under `key`.
    pub fn cache(&self, key: &str) -> PageRecord {
        let page = self.context.create(&self.context.route(key, VisitKind::Visit).unwrap());
        self.context.commit(&page, &doc(key))
    }

    pub fn entry(&self, key: &str, rev: &str) -> HistoryEntry {
        HistoryEntry {
            key: Key::from(key),
            rev: Key::from(rev),
            title: key.to_string(),
            scroll_x: 0.0,
            scroll_y: 0.0,
            targets: self.context.config().targets,
        }
    }

    pub fn hover(&self) -> HoverTrigger {
        HoverTrigger::new(Arc::clone(&self.prefetcher), self.timers.clone())
    }

    pub fn proximity(&self) -> ProximityTrigger {
        ProximityTrigger::new(Arc::clone(&self.prefetcher), self.timers.clone())
    }

    pub fn intersect(&self) -> IntersectTrigger {
        IntersectTrigger::new(Arc::clone(&self.prefetcher))
    }
}
