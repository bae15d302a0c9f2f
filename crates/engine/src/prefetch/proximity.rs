use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use pagewarp_core::{Key, LinkElement, VisitKind};

use super::{Candidate, Prefetched, Prefetcher, Rect, TriggerTimers};

#[derive(Debug, Clone)]
struct Target {
    key: Key,
    link: LinkElement,
    bounds: Rect,
    delay: Duration,
}

#[derive(Debug, Default)]
struct State {
    targets: Vec<Target>,
    connected: bool,
    /// A timer or fetch is running; further pointer moves are ignored.
    busy: bool,
    throttled_until: Option<Instant>,
}

/// Prefetches a link when the pointer comes within a distance of it.
pub struct ProximityTrigger {
    prefetcher: Arc<Prefetcher>,
    timers: TriggerTimers,
    state: Arc<Mutex<State>>,
}

/// Clears the busy flag however the scheduled task ends.
struct Busy(Arc<Mutex<State>>);

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.lock().busy = false;
    }
}

impl ProximityTrigger {
    pub fn new(prefetcher: Arc<Prefetcher>, timers: TriggerTimers) -> Self {
        Self { prefetcher, timers, state: Arc::default() }
    }

    /// Track candidates annotated for proximity. Returns the number tracked.
    pub fn connect(&self, candidates: impl IntoIterator<Item = Candidate>) -> usize {
        let context = self.prefetcher.context();
        let config = context.config();
        if !config.proximity.enabled {
            return 0;
        }

        let mut state = self.state.lock();
        for Candidate { link, rect } in candidates {
            let attrs = &link.attrs;
            if attrs.disabled || attrs.proximity != Some(true) {
                continue;
            }
            let Ok(key) = context.key(&link) else { continue };
            if context.has(&key) || state.targets.iter().any(|t| t.key == key) {
                continue;
            }

            let distance = attrs.proximity_distance.unwrap_or(config.proximity.distance);
            let delay = Duration::from_millis(attrs.threshold_ms.unwrap_or(config.proximity.threshold_ms));
            state.targets.push(Target { key, link, bounds: rect.expand(distance), delay });
        }

        state.connected = !state.targets.is_empty();
        tracing::debug!(targets = state.targets.len(), "proximity connected");
        state.targets.len()
    }

    /// Handle a pointer move. Returns `true` when a prefetch was scheduled.
    pub fn pointer_move(&self, x: f64, y: f64) -> bool {
        let mut state = self.state.lock();
        if !state.connected || state.busy {
            return false;
        }
        if state.throttled_until.is_some_and(|until| Instant::now() < until) {
            return false;
        }

        let hit = state
            .targets
            .iter()
            .find(|t| t.bounds.contains(x, y) && self.prefetcher.is_eligible(&t.key))
            .cloned();
        let Some(target) = hit else {
            let throttle = Duration::from_millis(self.prefetcher.context().config().proximity.throttle_ms);
            state.throttled_until = Some(Instant::now() + throttle);
            return false;
        };

        state.busy = true;
        drop(state);

        let busy = Busy(Arc::clone(&self.state));
        let prefetcher = Arc::clone(&self.prefetcher);
        let shared = Arc::clone(&self.state);
        // when the key already has a timer the future and its guard are dropped
        self.timers.schedule(target.key.clone(), target.delay, async move {
            let _busy = busy;
            let outcome = prefetcher.prefetch_settled(&target.link, VisitKind::Proximity).await;
            let mut state = shared.lock();
            match outcome {
                Prefetched::Vetoed => {
                    tracing::debug!(key = %target.key, "proximity vetoed; disconnecting");
                    state.targets.clear();
                    state.connected = false;
                }
                outcome if outcome.is_success() => {
                    state.targets.retain(|t| t.key != target.key);
                    if state.targets.is_empty() {
                        tracing::debug!("proximity targets exhausted; disconnecting");
                        state.connected = false;
                    }
                }
                _ => tracing::debug!(key = %target.key, "proximity prefetch did not complete"),
            }
        })
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn len(&self) -> usize {
        self.state.lock().targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn disconnect(&self) {
        let targets = {
            let mut state = self.state.lock();
            state.connected = false;
            state.throttled_until = None;
            std::mem::take(&mut state.targets)
        };
        for target in &targets {
            self.timers.cancel(&target.key);
        }
        tracing::debug!(count = targets.len(), "proximity disconnected");
    }
}
