//! The visit state machine.
//!
//! ```text
//! idle -> resolving -> (cache-hit | in-flight-wait | fetching) -> rendering -> committed
//!                                                    fetching -> failed -> full-navigation
//! ```
//!
//! [`Visits::acquire`] is the single decision algorithm behind user
//! triggers, programmatic visits, reloads, prefetches and history changes.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use pagewarp_client::{FetchCoordinator, Fetched};
use pagewarp_core::{Error, Key, NotNavigable, PagePatch, PageRecord, SessionContext, VisitKind};

use crate::platform::Platform;
use crate::render::{Rendered, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisitState {
    Idle,
    Resolving,
    CacheHit,
    InFlightWait,
    Fetching,
    Rendering,
    Committed,
    Failed,
    FullNavigation,
}

/// A document ready to render.
#[derive(Debug, Clone)]
pub enum Acquired {
    Ready { page: PageRecord, document: Arc<str> },
    Vetoed,
    Aborted,
    Failed(Arc<Error>),
}

/// How a navigation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    Rendered(PageRecord),
    NotNavigable(NotNavigable),
    /// A listener stopped the visit, the fetch or the render.
    Vetoed,
    /// The fetch was cancelled by a newer navigation.
    Aborted,
    /// The document could not be fetched; the platform was sent there directly.
    FullNavigation { key: Key, reason: String },
}

impl Navigation {
    pub fn page(&self) -> Option<&PageRecord> {
        match self {
            Navigation::Rendered(page) => Some(page),
            _ => None,
        }
    }
}

pub struct Visits {
    context: Arc<SessionContext>,
    coordinator: Arc<FetchCoordinator>,
    renderer: Arc<Renderer>,
    platform: Platform,
    state: watch::Sender<VisitState>,
}

impl Visits {
    pub fn new(
        context: Arc<SessionContext>, coordinator: Arc<FetchCoordinator>, renderer: Arc<Renderer>, platform: Platform,
    ) -> Self {
        let (state, _) = watch::channel(VisitState::Idle);
        Self { context, coordinator, renderer, platform, state }
    }

    pub fn state(&self) -> VisitState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<VisitState> {
        self.state.subscribe()
    }

    pub(crate) fn transition(&self, state: VisitState) {
        tracing::trace!(?state, "visit state");
        self.state.send_replace(state);
    }

    /// Obtain the document for `page`: from the cache, by joining a pending
    /// fetch, or by fetching it.
    pub async fn acquire(&self, page: &PageRecord) -> Acquired {
        // a fetch can finish between the pending check and the join; the
        // second pass then sees it in the cache
        for _ in 0..2 {
            if self.context.has(&page.key) {
                self.transition(VisitState::CacheHit);
                let cached = {
                    let mut store = self.context.store();
                    store.snapshot(&page.key).zip(store.find(&page.key).cloned())
                };
                if let Some((document, page)) = cached {
                    return Acquired::Ready { page, document };
                }
            }

            if self.coordinator.is_pending(&page.key) {
                self.transition(VisitState::InFlightWait);
                match self.coordinator.join(&page.key).await {
                    Some(result) => return acquired(result),
                    None => continue,
                }
            }

            self.transition(VisitState::Fetching);
            return match self.coordinator.fetch(page).await {
                Ok(Fetched::InTransit) => match self.coordinator.join(&page.key).await {
                    Some(result) => acquired(result),
                    None => continue,
                },
                result => acquired(result),
            };
        }

        Acquired::Aborted
    }

    /// Acquire and render `page` as a navigation of `kind`.
    ///
    /// A fetch failure falls back to a full navigation.
    pub async fn navigate(&self, page: &PageRecord, kind: VisitKind) -> Navigation {
        match self.acquire(page).await {
            Acquired::Ready { page, document } => self.render(&page, &document, kind).await,
            Acquired::Vetoed => {
                self.transition(VisitState::Idle);
                Navigation::Vetoed
            }
            Acquired::Aborted => {
                self.transition(VisitState::Idle);
                Navigation::Aborted
            }
            Acquired::Failed(e) => self.fall_back(&page.key, &e),
        }
    }

    pub(crate) async fn render(&self, page: &PageRecord, document: &str, kind: VisitKind) -> Navigation {
        self.transition(VisitState::Rendering);
        let page = self.context.patch(&page.key, PagePatch::kind(kind)).unwrap_or_else(|| {
            let mut page = page.clone();
            page.kind = kind;
            page
        });

        match self.renderer.render(&page, document).await {
            Rendered::Committed(page) => {
                self.transition(VisitState::Committed);
                Navigation::Rendered(page)
            }
            Rendered::Vetoed => {
                self.transition(VisitState::Idle);
                Navigation::Vetoed
            }
        }
    }

    pub(crate) fn fall_back(&self, key: &Key, error: &Error) -> Navigation {
        self.transition(VisitState::Failed);
        tracing::warn!(key = %key, error = %error, "falling back to full navigation");
        self.platform.viewport.assign(key);
        self.transition(VisitState::FullNavigation);
        Navigation::FullNavigation { key: key.clone(), reason: error.to_string() }
    }
}

fn acquired(result: Result<Fetched, Error>) -> Acquired {
    match result {
        Ok(Fetched::Page { page, document }) => Acquired::Ready { page, document },
        Ok(Fetched::Vetoed) => Acquired::Vetoed,
        Ok(Fetched::Aborted) | Ok(Fetched::InTransit) => Acquired::Aborted,
        Err(e) => Acquired::Failed(Arc::new(e)),
    }
}
