//! The render step shared by every navigation.

use std::sync::Arc;

use pagewarp_core::{Event, EventKind, PagePatch, PageRecord, SessionContext, VisitKind};

use crate::platform::Platform;

#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Committed(PageRecord),
    /// A `before-render` listener stopped the swap.
    Vetoed,
}

pub struct Renderer {
    context: Arc<SessionContext>,
    platform: Platform,
}

impl Renderer {
    pub fn new(context: Arc<SessionContext>, platform: Platform) -> Self {
        Self { context, platform }
    }

    /// Swap `document` into the live view as `page`.
    ///
    /// Order: save the outgoing scroll position, `before-render`, per target
    /// `render` then patch, scroll, evaluate scripts, count the visit, write
    /// history, `after-render`, `load`.
    pub async fn render(&self, page: &PageRecord, document: &str) -> Rendered {
        let context = &self.context;

        let outgoing = context.current();
        if outgoing != page.key && context.find(&outgoing).is_some() {
            let (x, y) = self.platform.viewport.scroll_position();
            context.patch(&outgoing, PagePatch::scroll(x, y));
        }

        if context.events().emit(Event::new(EventKind::BeforeRender, page).with_document(document)).is_vetoed() {
            tracing::debug!(key = %page.key, "render cancelled within dispatched event");
            return Rendered::Vetoed;
        }

        for target in &page.targets {
            let event = Event::new(EventKind::Render, page).with_document(document).with_target(target);
            if context.events().emit(event).is_vetoed() {
                tracing::debug!(key = %page.key, target = %target, "target render vetoed");
                continue;
            }
            if !self.platform.patcher.patch(target, document) {
                tracing::warn!(key = %page.key, target = %target, "target not found in document");
            }
        }

        self.platform.viewport.scroll_to(page.scroll_x, page.scroll_y);
        self.platform.evaluator.evaluate(document).await;

        let visited = {
            let mut store = context.store();
            store.patch(&page.key, PagePatch::kind(page.kind));
            store.visited(&page.key)
        };
        let mut page = page.clone();
        if let Some(visited) = visited {
            page.visits = visited.visits;
        }

        let entry = page.entry();
        match page.kind {
            VisitKind::Initial | VisitKind::Popstate | VisitKind::Reload => self.platform.history.replace(&entry),
            _ if !page.history => self.platform.history.replace(&entry),
            _ => self.platform.history.push(&entry),
        }

        context.emit(EventKind::AfterRender, &page);
        context.emit(EventKind::Load, &page);

        tracing::info!(key = %page.key, kind = %page.kind, visits = page.visits, "rendered");
        Rendered::Committed(page)
    }
}
