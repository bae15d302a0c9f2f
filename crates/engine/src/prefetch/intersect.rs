use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;

use pagewarp_core::{Key, LinkElement, LinkRef, VisitKind};

use super::{Candidate, Prefetched, Prefetcher, Rect};

/// Root margin around the viewport, CSS shorthand order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margin {
    /// Parse one to four `px` lengths (`"10px"`, `"10px 0px"`, ...).
    pub fn parse(input: &str) -> Option<Margin> {
        let values = input
            .split_whitespace()
            .map(|part| part.strip_suffix("px").unwrap_or(part).parse::<f64>().ok())
            .collect::<Option<Vec<_>>>()?;

        let (top, right, bottom, left) = match values.as_slice() {
            [all] => (*all, *all, *all, *all),
            [vertical, horizontal] => (*vertical, *horizontal, *vertical, *horizontal),
            [top, horizontal, bottom] => (*top, *horizontal, *bottom, *horizontal),
            [top, right, bottom, left] => (*top, *right, *bottom, *left),
            _ => return None,
        };
        Some(Margin { top, right, bottom, left })
    }

    /// Grow `rect` by this margin. Negative values shrink it.
    pub fn apply(&self, rect: &Rect) -> Rect {
        Rect::new(
            rect.x - self.left,
            rect.y - self.top,
            rect.width + self.left + self.right,
            rect.height + self.top + self.bottom,
        )
    }
}

type Observed = Arc<Mutex<HashMap<Key, Candidate>>>;

/// Prefetches annotated links as they scroll into view.
pub struct IntersectTrigger {
    prefetcher: Arc<Prefetcher>,
    observed: Observed,
}

impl IntersectTrigger {
    pub fn new(prefetcher: Arc<Prefetcher>) -> Self {
        Self { prefetcher, observed: Arc::default() }
    }

    /// Observe candidates annotated for intersection. Returns the number
    /// observed.
    pub fn observe(&self, candidates: impl IntoIterator<Item = Candidate>) -> usize {
        let context = self.prefetcher.context();
        if !context.config().intersect.enabled {
            return 0;
        }

        let mut observed = self.observed.lock();
        for candidate in candidates {
            let attrs = &candidate.link.attrs;
            if attrs.disabled || attrs.intersect != Some(true) {
                continue;
            }
            let Ok(key) = context.key(&candidate.link) else { continue };
            if !context.has(&key) {
                observed.insert(key, candidate);
            }
        }
        tracing::debug!(observed = observed.len(), "intersection observing");
        observed.len()
    }

    /// The observer reported `link` visible.
    ///
    /// Returns `None` when the link is not observed. Success and veto both
    /// stop observing; a failed fetch keeps the link for the next report.
    pub async fn visible<'a>(&self, link: impl Into<LinkRef<'a>>) -> Option<Prefetched> {
        let key = self.prefetcher.context().key(link).ok()?;
        let link: LinkElement = self.observed.lock().get(&key)?.link.clone();
        Some(entered(&self.prefetcher, &self.observed, &key, &link).await)
    }

    /// Report a new viewport. Every observed link whose visible share
    /// reaches the configured threshold is treated as visible; their
    /// prefetches run concurrently.
    pub async fn viewport(&self, view: Rect) -> Vec<(Key, Prefetched)> {
        let config = self.prefetcher.context().config().intersect;
        let margin = Margin::parse(&config.root_margin).unwrap_or_else(|| {
            tracing::warn!(root_margin = %config.root_margin, "unparsable root margin; using none");
            Margin::default()
        });
        let root = margin.apply(&view);

        let hits: Vec<(Key, LinkElement)> = self
            .observed
            .lock()
            .iter()
            .filter(|(_, candidate)| crossed(&candidate.rect, &root, config.threshold))
            .map(|(key, candidate)| (key.clone(), candidate.link.clone()))
            .collect();

        let mut tasks = JoinSet::new();
        for (key, link) in hits {
            let prefetcher = Arc::clone(&self.prefetcher);
            let observed = Arc::clone(&self.observed);
            tasks.spawn(async move {
                let outcome = entered(&prefetcher, &observed, &key, &link).await;
                (key, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::warn!(error = %e, "intersection prefetch task failed"),
            }
        }
        outcomes
    }

    pub fn unobserve(&self, key: &Key) -> bool {
        self.observed.lock().remove(key).is_some()
    }

    pub fn is_observing(&self, key: &Key) -> bool {
        self.observed.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.observed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn disconnect(&self) {
        let count = std::mem::take(&mut *self.observed.lock()).len();
        tracing::debug!(count, "intersection disconnected");
    }
}

/// Prefetch an observed link that became visible. Failures keep it observed.
async fn entered(prefetcher: &Prefetcher, observed: &Observed, key: &Key, link: &LinkElement) -> Prefetched {
    let outcome = prefetcher.prefetch_settled(link, VisitKind::Intersect).await;
    match outcome {
        Prefetched::Failed(_) | Prefetched::Aborted => {
            tracing::debug!(key = %key, "intersection prefetch did not complete; still observing");
        }
        _ => {
            observed.lock().remove(key);
        }
    }
    outcome
}

fn crossed(rect: &Rect, root: &Rect, threshold: f64) -> bool {
    let Some(overlap) = rect.intersection(root) else { return false };
    if threshold <= 0.0 {
        return true;
    }
    let area = rect.area();
    area > 0.0 && overlap.area() / area >= threshold
}
