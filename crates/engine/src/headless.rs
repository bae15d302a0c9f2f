//! In-memory platform used by tests and the CLI driver.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use scraper::{Html, Selector};

use pagewarp_core::{HistoryEntry, Key};

use crate::platform::{ContentPatcher, History, Platform, ScriptEvaluator, Viewport};

/// A history stack with a movable cursor.
#[derive(Debug)]
pub struct MemoryHistory {
    inner: Mutex<Stack>,
}

#[derive(Debug)]
struct Stack {
    entries: Vec<Option<HistoryEntry>>,
    locations: Vec<Key>,
    index: usize,
    pushes: usize,
    replaces: usize,
}

impl MemoryHistory {
    /// A stack with one entry at `location` and no session state.
    pub fn new(location: &str) -> Self {
        Self {
            inner: Mutex::new(Stack {
                entries: vec![None],
                locations: vec![Key::from(location)],
                index: 0,
                pushes: 0,
                replaces: 0,
            }),
        }
    }

    /// Move the cursor back. Returns the entry now current, as a back
    /// signal would deliver it.
    pub fn back(&self) -> Option<HistoryEntry> {
        let mut stack = self.inner.lock();
        if stack.index == 0 {
            return None;
        }
        stack.index -= 1;
        stack.entries[stack.index].clone()
    }

    pub fn forward(&self) -> Option<HistoryEntry> {
        let mut stack = self.inner.lock();
        if stack.index + 1 >= stack.entries.len() {
            return None;
        }
        stack.index += 1;
        stack.entries[stack.index].clone()
    }

    /// Overwrite the current location without touching entry state.
    pub fn set_location(&self, key: &str) {
        let mut stack = self.inner.lock();
        let index = stack.index;
        stack.locations[index] = Key::from(key);
    }

    pub fn entries(&self) -> Vec<Option<HistoryEntry>> {
        self.inner.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pushes(&self) -> usize {
        self.inner.lock().pushes
    }

    pub fn replaces(&self) -> usize {
        self.inner.lock().replaces
    }
}

impl History for MemoryHistory {
    fn push(&self, entry: &HistoryEntry) {
        let mut stack = self.inner.lock();
        let next = stack.index + 1;
        stack.entries.truncate(next);
        stack.locations.truncate(next);
        stack.entries.push(Some(entry.clone()));
        stack.locations.push(entry.key.clone());
        stack.index = next;
        stack.pushes += 1;
    }

    fn replace(&self, entry: &HistoryEntry) {
        let mut stack = self.inner.lock();
        let index = stack.index;
        stack.entries[index] = Some(entry.clone());
        stack.locations[index] = entry.key.clone();
        stack.replaces += 1;
    }

    fn current(&self) -> Option<HistoryEntry> {
        let stack = self.inner.lock();
        stack.entries[stack.index].clone()
    }

    fn location(&self) -> Key {
        let stack = self.inner.lock();
        stack.locations[stack.index].clone()
    }
}

/// Records scroll position and full navigations.
#[derive(Debug, Default)]
pub struct HeadlessViewport {
    scroll: Mutex<(f64, f64)>,
    assigned: Mutex<Vec<Key>>,
}

impl HeadlessViewport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys handed to a full navigation, in order.
    pub fn assigned(&self) -> Vec<Key> {
        self.assigned.lock().clone()
    }
}

impl Viewport for HeadlessViewport {
    fn scroll_position(&self) -> (f64, f64) {
        *self.scroll.lock()
    }

    fn scroll_to(&self, x: f64, y: f64) {
        *self.scroll.lock() = (x, y);
    }

    fn assign(&self, key: &Key) {
        tracing::info!(key = %key, "full navigation");
        self.assigned.lock().push(key.clone());
    }
}

/// Keeps the outer HTML of every patched region.
#[derive(Debug, Default)]
pub struct HeadlessDocument {
    regions: Mutex<HashMap<String, String>>,
    evaluations: Mutex<usize>,
}

impl HeadlessDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content of `target`, as last patched.
    pub fn region(&self, target: &str) -> Option<String> {
        self.regions.lock().get(target).cloned()
    }

    pub fn evaluations(&self) -> usize {
        *self.evaluations.lock()
    }
}

impl ContentPatcher for HeadlessDocument {
    fn patch(&self, target: &str, document: &str) -> bool {
        let Ok(selector) = Selector::parse(target) else {
            tracing::warn!(target, "invalid target selector");
            return false;
        };
        let html = Html::parse_document(document);
        match html.select(&selector).next() {
            Some(node) => {
                self.regions.lock().insert(target.to_string(), node.html());
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ScriptEvaluator for HeadlessDocument {
    async fn evaluate(&self, _document: &str) {
        *self.evaluations.lock() += 1;
    }
}

/// A complete headless platform plus handles to inspect it.
#[derive(Debug, Clone)]
pub struct Headless {
    pub history: Arc<MemoryHistory>,
    pub viewport: Arc<HeadlessViewport>,
    pub document: Arc<HeadlessDocument>,
}

impl Headless {
    pub fn new(location: &str) -> Self {
        Self {
            history: Arc::new(MemoryHistory::new(location)),
            viewport: Arc::new(HeadlessViewport::new()),
            document: Arc::new(HeadlessDocument::new()),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            history: self.history.clone(),
            viewport: self.viewport.clone(),
            patcher: self.document.clone(),
            evaluator: self.document.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str) -> HistoryEntry {
        HistoryEntry {
            key: Key::from(key),
            rev: Key::from("/"),
            title: String::new(),
            scroll_x: 0.0,
            scroll_y: 0.0,
            targets: vec!["body".into()],
        }
    }

    #[test]
    fn test_history_push_back_forward() {
        let history = MemoryHistory::new("/");
        history.replace(&entry("/"));
        history.push(&entry("/a"));
        history.push(&entry("/b"));
        assert_eq!(history.location(), Key::from("/b"));

        assert_eq!(history.back().map(|e| e.key), Some(Key::from("/a")));
        assert_eq!(history.location(), Key::from("/a"));

        // pushing from the middle drops forward entries
        history.push(&entry("/c"));
        assert_eq!(history.forward(), None);
        assert_eq!(history.len(), 3);
        assert_eq!(history.pushes(), 3);
        assert_eq!(history.replaces(), 1);
    }

    #[test]
    fn test_patch_regions() {
        let document = HeadlessDocument::new();
        let html = "<html><body><main id=\"m\">hi</main></body></html>";
        assert!(document.patch("main", html));
        assert_eq!(document.region("main").as_deref(), Some("<main id=\"m\">hi</main>"));
        assert!(!document.patch("aside", html));
        assert!(!document.patch("<<", html));
    }
}
