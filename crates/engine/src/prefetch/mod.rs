//! Speculative prefetch triggers.
//!
//! Hover, pointer proximity and viewport intersection all end in
//! [`Prefetcher::prefetch`], which never touches a cached or in-flight key
//! and lets a `prefetch` listener veto the request.

mod hover;
mod intersect;
mod proximity;
mod timers;

pub use hover::HoverTrigger;
pub use intersect::{IntersectTrigger, Margin};
pub use proximity::ProximityTrigger;
pub use timers::TriggerTimers;

use std::sync::Arc;

use serde::Serialize;

use pagewarp_client::{FetchCoordinator, Fetched};
use pagewarp_core::{Error, EventKind, Key, LinkElement, LinkRef, NotNavigable, PageRecord, SessionContext, VisitKind};

/// Axis-aligned box in viewport coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Edges are inclusive.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// Grow the box by `distance` on every side.
    pub fn expand(&self, distance: f64) -> Rect {
        Rect::new(self.x - distance, self.y - distance, self.width + 2.0 * distance, self.height + 2.0 * distance)
    }

    /// Overlap with `other`, if the boxes touch at all.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right >= x && bottom >= y).then(|| Rect::new(x, y, right - x, bottom - y))
    }
}

/// A link together with its on-screen bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub link: LinkElement,
    pub rect: Rect,
}

impl Candidate {
    pub fn new(link: LinkElement, rect: Rect) -> Self {
        Self { link, rect }
    }
}

/// How a prefetch attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Prefetched {
    /// Fetched and committed.
    Fetched(PageRecord),
    /// Already cached; nothing was requested.
    Cached,
    /// Another request for the key is already running.
    InTransit,
    Vetoed,
    Aborted,
    Failed(String),
    NotNavigable(NotNavigable),
}

impl Prefetched {
    /// The key is, or will shortly be, in the cache.
    pub fn is_success(&self) -> bool {
        matches!(self, Prefetched::Fetched(_) | Prefetched::Cached | Prefetched::InTransit)
    }
}

/// Runs a single speculative fetch on behalf of a trigger.
pub struct Prefetcher {
    context: Arc<SessionContext>,
    coordinator: Arc<FetchCoordinator>,
}

impl Prefetcher {
    pub fn new(context: Arc<SessionContext>, coordinator: Arc<FetchCoordinator>) -> Self {
        Self { context, coordinator }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// The key is neither cached nor being fetched.
    pub fn is_eligible(&self, key: &Key) -> bool {
        !self.context.has(key) && !self.coordinator.is_pending(key)
    }

    /// Resolve `link` and fetch it as a speculative `kind` visit.
    pub async fn prefetch<'a>(&self, link: impl Into<LinkRef<'a>>, kind: VisitKind) -> Prefetched {
        let route = match self.context.route(link, kind) {
            Ok(route) => route,
            Err(reason) => return Prefetched::NotNavigable(reason),
        };
        if self.context.has(&route.key) {
            return Prefetched::Cached;
        }
        if self.coordinator.is_pending(&route.key) {
            return Prefetched::InTransit;
        }

        let page = self.context.create(&route);
        if self.context.emit(EventKind::Prefetch, &page).is_vetoed() {
            tracing::debug!(key = %page.key, kind = %kind, "prefetch cancelled within dispatched event");
            return Prefetched::Vetoed;
        }

        tracing::debug!(key = %page.key, kind = %kind, "prefetch");
        prefetched(self.coordinator.fetch(&page).await, &page.key)
    }

    /// Like [`Prefetcher::prefetch`], but an `InTransit` outcome waits for
    /// the other request and reports how it ended.
    pub async fn prefetch_settled<'a>(&self, link: impl Into<LinkRef<'a>>, kind: VisitKind) -> Prefetched {
        let link = link.into();
        match self.prefetch(link, kind).await {
            Prefetched::InTransit => {
                let Ok(key) = self.context.key(link) else { return Prefetched::Aborted };
                match self.coordinator.join(&key).await {
                    Some(result) => prefetched(result, &key),
                    None if self.context.has(&key) => Prefetched::Cached,
                    None => Prefetched::Aborted,
                }
            }
            outcome => outcome,
        }
    }
}

fn prefetched(result: Result<Fetched, Error>, key: &Key) -> Prefetched {
    match result {
        Ok(Fetched::Page { page, .. }) => Prefetched::Fetched(page),
        Ok(Fetched::InTransit) => Prefetched::InTransit,
        Ok(Fetched::Vetoed) => Prefetched::Vetoed,
        Ok(Fetched::Aborted) => Prefetched::Aborted,
        Err(e) => {
            tracing::debug!(key = %key, error = %e, "prefetch failed");
            Prefetched::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, doc};

    #[test]
    fn test_rect_geometry() {
        let rect = Rect::new(10.0, 10.0, 20.0, 10.0);
        assert!(rect.contains(10.0, 20.0));
        assert!(!rect.contains(31.0, 15.0));

        let grown = rect.expand(5.0);
        assert_eq!(grown, Rect::new(5.0, 5.0, 30.0, 20.0));
        assert!(grown.contains(33.0, 24.0));

        let overlap = rect.intersection(&Rect::new(20.0, 0.0, 100.0, 15.0)).unwrap();
        assert_eq!(overlap, Rect::new(20.0, 10.0, 10.0, 5.0));
        assert_eq!(overlap.area(), 50.0);
        assert!(rect.intersection(&Rect::new(100.0, 100.0, 1.0, 1.0)).is_none());
    }

    #[tokio::test]
    async fn test_prefetch_outcomes() {
        let f = Fixture::new("/");
        f.transport.page("/a", doc("/a")).status("/broken", 500);

        let fetched = f.prefetcher.prefetch("/a", VisitKind::Hover).await;
        let Prefetched::Fetched(page) = fetched else { panic!("expected fetch") };
        assert_eq!(page.kind, VisitKind::Prefetch);

        assert_eq!(f.prefetcher.prefetch("/a", VisitKind::Hover).await, Prefetched::Cached);
        assert!(matches!(f.prefetcher.prefetch("/broken", VisitKind::Hover).await, Prefetched::Failed(_)));
        assert_eq!(
            f.prefetcher.prefetch("https://elsewhere.org/x", VisitKind::Hover).await,
            Prefetched::NotNavigable(NotNavigable::CrossOrigin)
        );
        assert_eq!(f.transport.total_requests(), 2);
    }

    #[tokio::test]
    async fn test_prefetch_event_veto() {
        let f = Fixture::new("/");
        f.transport.page("/a", doc("/a"));
        f.context.events().on(EventKind::Prefetch, |_| pagewarp_core::Decision::Veto);

        assert_eq!(f.prefetcher.prefetch("/a", VisitKind::Intersect).await, Prefetched::Vetoed);
        assert_eq!(f.transport.total_requests(), 0);
    }
}
