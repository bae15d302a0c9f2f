//! Fetch coordination.
//!
//! The in-flight registry is the only source of truth for "is this key being
//! fetched". At most one request per key exists at a time; later callers
//! either get [`Fetched::InTransit`] or join the pending request through
//! [`FetchCoordinator::join`].
//!
//! A request's registry entry is released by a drop guard, so it is removed
//! whether the request completes, fails, is aborted, or its driving future
//! is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use pagewarp_core::{Error, EventKind, Key, PageRecord, SessionContext, VisitKind};

use crate::fetch::{Request, Transport, TransportError};

/// Outcome of [`FetchCoordinator::fetch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// The document arrived and was committed.
    Page { page: PageRecord, document: Arc<str> },
    /// Another request for the key is already running.
    InTransit,
    /// A `fetch` listener vetoed the request.
    Vetoed,
    /// The request was aborted before completing.
    Aborted,
}

impl Fetched {
    pub fn page(&self) -> Option<&PageRecord> {
        match self {
            Fetched::Page { page, .. } => Some(page),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Completion {
    Page(PageRecord, Arc<str>),
    Failed(TransportError),
    Aborted,
}

struct Pending {
    id: u64,
    kind: VisitKind,
    token: CancellationToken,
    done: watch::Receiver<Option<Completion>>,
}

type Registry = Arc<Mutex<HashMap<Key, Pending>>>;

/// Removes a registry entry when the request driving it ends.
struct RegistryGuard {
    registry: Registry,
    key: Key,
    id: u64,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        // an abort may already have replaced the entry
        if registry.get(&self.key).is_some_and(|p| p.id == self.id) {
            registry.remove(&self.key);
        }
    }
}

/// One registered request, driven either on its own task or inline.
struct Job {
    context: Arc<SessionContext>,
    transport: Arc<dyn Transport>,
    guard: RegistryGuard,
    page: PageRecord,
    request: Request,
    token: CancellationToken,
    done: watch::Sender<Option<Completion>>,
}

impl Job {
    async fn run(self) {
        let Job { context, transport, guard, page, request, token, done } = self;

        let completion = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::warn!(key = %page.key, "pending fetch aborted");
                context.memory().record(0);
                Completion::Aborted
            }
            result = transport.get(request) => match result {
                Ok(response) => {
                    context.memory().record(response.len());
                    let document = response.text();
                    let committed = context.commit(&page, &document);
                    Completion::Page(committed, Arc::from(document))
                }
                Err(e) => {
                    tracing::warn!(key = %page.key, error = %e, "fetch failed");
                    context.memory().record(e.bytes());
                    Completion::Failed(e)
                }
            },
        };

        drop(guard);
        let _ = done.send(Some(completion));
    }
}

pub struct FetchCoordinator {
    context: Arc<SessionContext>,
    transport: Arc<dyn Transport>,
    registry: Registry,
    next_id: AtomicU64,
}

impl FetchCoordinator {
    pub fn new(context: Arc<SessionContext>, transport: Arc<dyn Transport>) -> Self {
        Self { context, transport, registry: Arc::new(Mutex::new(HashMap::new())), next_id: AtomicU64::new(1) }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Fetch the document for `page` and commit it.
    ///
    /// Network failures are returned as errors; they are never retried.
    pub async fn fetch(&self, page: &PageRecord) -> Result<Fetched, Error> {
        if self.is_pending(&page.key) {
            if page.kind == VisitKind::Reverse {
                self.abort(&page.rev);
                tracing::warn!(key = %page.key, rev = %page.rev, "reverse fetch aborted");
            } else {
                tracing::warn!(key = %page.key, "fetch already in transit");
            }
            return Ok(Fetched::InTransit);
        }

        if self.context.emit(EventKind::Fetch, page).is_vetoed() {
            tracing::warn!(key = %page.key, "fetch cancelled within dispatched event");
            return Ok(Fetched::Vetoed);
        }

        let url = self.context.resolver().origin().join(&page.key)?;
        let request = Request::new(page.key.clone(), url, page.kind, self.context.id());

        let (tx, mut rx) = watch::channel(None);
        let token = CancellationToken::new();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut registry = self.registry.lock();
            // a listener may have started the same key while we were unlocked
            if registry.contains_key(&page.key) {
                return Ok(Fetched::InTransit);
            }
            registry.insert(
                page.key.clone(),
                Pending { id, kind: page.kind, token: token.clone(), done: rx.clone() },
            );
        }

        tracing::debug!(key = %page.key, kind = %page.kind, "fetch started");

        let job = Job {
            context: Arc::clone(&self.context),
            transport: Arc::clone(&self.transport),
            guard: RegistryGuard { registry: Arc::clone(&self.registry), key: page.key.clone(), id },
            page: page.clone(),
            request,
            token,
            done: tx,
        };

        if self.context.config().request.async_requests {
            tokio::spawn(job.run());
        } else {
            job.run().await;
        }

        resolve(wait(&mut rx).await, &page.key)
    }

    /// Wait for a pending request for `key`.
    ///
    /// Returns `None` when nothing is in flight for the key.
    pub async fn join(&self, key: &Key) -> Option<Result<Fetched, Error>> {
        let mut rx = self.registry.lock().get(key).map(|p| p.done.clone())?;
        Some(resolve(wait(&mut rx).await, key))
    }

    /// Wait for a pending fetch of `page` and return the committed record.
    ///
    /// Returns `page` unchanged when nothing is in flight, and `None` when the
    /// pending request failed or was aborted.
    pub async fn await_if_pending(&self, page: &PageRecord) -> Option<PageRecord> {
        match self.join(&page.key).await {
            None => Some(page.clone()),
            Some(Ok(Fetched::Page { page, .. })) => Some(page),
            Some(_) => None,
        }
    }

    /// Abort every in-flight fetch except the one for `except`.
    pub fn cancel_others(&self, except: &Key) -> usize {
        let aborted: Vec<Pending> = {
            let mut registry = self.registry.lock();
            let keys: Vec<Key> = registry.keys().filter(|key| *key != except).cloned().collect();
            keys.iter().filter_map(|key| registry.remove(key)).collect()
        };
        for pending in &aborted {
            pending.token.cancel();
        }
        if !aborted.is_empty() {
            tracing::debug!(except = %except, count = aborted.len(), "cancelled other fetches");
        }
        aborted.len()
    }

    /// Abort the fetch for `key`. No-op when idle.
    pub fn abort(&self, key: &Key) -> bool {
        let pending = self.registry.lock().remove(key);
        match pending {
            Some(pending) => {
                pending.token.cancel();
                tracing::debug!(key = %key, kind = %pending.kind, "fetch aborted");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Pending> = self.registry.lock().drain().map(|(_, pending)| pending).collect();
        for pending in &drained {
            pending.token.cancel();
        }
        drained.len()
    }

    pub fn is_pending(&self, key: &Key) -> bool {
        self.registry.lock().contains_key(key)
    }

    pub fn in_flight(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.registry.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Wait for the completion value. A sender dropped without a value means
/// the driving future was dropped, which counts as an abort.
async fn wait(rx: &mut watch::Receiver<Option<Completion>>) -> Completion {
    match rx.wait_for(Option::is_some).await {
        Ok(value) => value.clone().unwrap_or(Completion::Aborted),
        Err(_) => Completion::Aborted,
    }
}

fn resolve(completion: Completion, key: &Key) -> Result<Fetched, Error> {
    match completion {
        Completion::Page(page, document) => Ok(Fetched::Page { page, document }),
        Completion::Failed(e) => Err(e.into_error(key)),
        Completion::Aborted => Ok(Fetched::Aborted),
    }
}
