//! Lifecycle event bus.
//!
//! Listeners are synchronous and may veto an operation or, for
//! [`EventKind::BeforeCache`], substitute the document about to be stored.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::page::PageRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Visit,
    Fetch,
    Prefetch,
    BeforeCache,
    AfterCache,
    BeforeRender,
    Render,
    AfterRender,
    Load,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Visit => "visit",
            EventKind::Fetch => "fetch",
            EventKind::Prefetch => "prefetch",
            EventKind::BeforeCache => "before-cache",
            EventKind::AfterCache => "after-cache",
            EventKind::BeforeRender => "before-render",
            EventKind::Render => "render",
            EventKind::AfterRender => "after-render",
            EventKind::Load => "load",
        }
    }

    /// Whether a listener can stop the operation this event announces.
    pub fn is_vetoable(self) -> bool {
        matches!(
            self,
            EventKind::Visit
                | EventKind::Fetch
                | EventKind::Prefetch
                | EventKind::BeforeCache
                | EventKind::BeforeRender
                | EventKind::Render
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload handed to listeners.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub kind: EventKind,
    pub page: &'a PageRecord,
    /// Document being cached or rendered, when the event carries one.
    pub document: Option<&'a str>,
    /// Region selector for [`EventKind::Render`].
    pub target: Option<&'a str>,
}

impl<'a> Event<'a> {
    pub fn new(kind: EventKind, page: &'a PageRecord) -> Self {
        Self { kind, page, document: None, target: None }
    }

    pub fn with_document(mut self, document: &'a str) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_target(mut self, target: &'a str) -> Self {
        self.target = Some(target);
        self
    }
}

/// A listener's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Veto,
    Substitute(String),
}

pub type Listener = Arc<dyn Fn(&Event<'_>) -> Decision + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Result of dispatching an event to every listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Proceed,
    /// Proceed with this document instead of the original.
    Substituted(String),
    Vetoed,
}

impl Dispatch {
    pub fn is_vetoed(&self) -> bool {
        matches!(self, Dispatch::Vetoed)
    }
}

#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<(ListenerId, EventKind, Listener)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").field("listeners", &self.listeners.lock().len()).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event<'_>) -> Decision + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, kind, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().iter().filter(|(_, k, _)| *k == kind).count()
    }

    /// Call every listener registered for `event.kind` in registration order.
    ///
    /// A veto stops dispatch immediately. Substitutions fold left to right,
    /// each listener seeing the latest document; they are only honored for
    /// `before-cache`. A panicking listener is logged and skipped.
    pub fn emit(&self, event: Event<'_>) -> Dispatch {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, kind, _)| *kind == event.kind)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        let mut substitute: Option<String> = None;
        for listener in listeners {
            let current = Event { document: substitute.as_deref().or(event.document), ..event };
            let decision = match catch_unwind(AssertUnwindSafe(|| listener(&current))) {
                Ok(decision) => decision,
                Err(_) => {
                    tracing::error!(event = %event.kind, key = %event.page.key, "event listener panicked");
                    continue;
                }
            };

            match decision {
                Decision::Continue => {}
                Decision::Veto if event.kind.is_vetoable() => {
                    tracing::debug!(event = %event.kind, key = %event.page.key, "vetoed by listener");
                    return Dispatch::Vetoed;
                }
                Decision::Veto => {
                    tracing::debug!(event = %event.kind, "veto ignored for non-vetoable event");
                }
                Decision::Substitute(document) if event.kind == EventKind::BeforeCache => {
                    substitute = Some(document);
                }
                Decision::Substitute(_) => {
                    tracing::debug!(event = %event.kind, "substitution ignored outside before-cache");
                }
            }
        }

        match substitute {
            Some(document) => Dispatch::Substituted(document),
            None => Dispatch::Proceed,
        }
    }
}
