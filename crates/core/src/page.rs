//! Page records and history entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::location::Key;

/// What produced the last version of a page record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitKind {
    Initial,
    Visit,
    Hover,
    Intersect,
    Proximity,
    Preload,
    Reverse,
    Popstate,
    Reload,
    Prefetch,
    Fetch,
}

impl VisitKind {
    /// Speculative kinds that are recorded as `Prefetch` once committed.
    pub fn is_prefetch_family(self) -> bool {
        matches!(self, VisitKind::Hover | VisitKind::Intersect | VisitKind::Proximity | VisitKind::Prefetch)
    }

    /// Kind stored on the record after a commit.
    pub fn normalized(self) -> Self {
        if self.is_prefetch_family() { VisitKind::Prefetch } else { self }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VisitKind::Initial => "initial",
            VisitKind::Visit => "visit",
            VisitKind::Hover => "hover",
            VisitKind::Intersect => "intersect",
            VisitKind::Proximity => "proximity",
            VisitKind::Preload => "preload",
            VisitKind::Reverse => "reverse",
            VisitKind::Popstate => "popstate",
            VisitKind::Reload => "reload",
            VisitKind::Prefetch => "prefetch",
            VisitKind::Fetch => "fetch",
        }
    }
}

impl fmt::Display for VisitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque id of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State for one navigable location.
///
/// Created the first time a key is seen and mutated in place afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub key: Key,
    /// Key of the page this one was reached from.
    pub rev: Key,
    /// Set when caching is enabled for the record; the document itself only
    /// exists once the first commit writes it.
    pub snapshot: Option<SnapshotId>,
    pub kind: VisitKind,
    pub cacheable: bool,
    /// Push (`true`) or replace (`false`) the history entry on render.
    pub history: bool,
    pub targets: Vec<String>,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub visits: u32,
    pub title: String,
    pub hover_delay_ms: u64,
    pub proximity_distance: f64,
    pub proximity_delay_ms: u64,
    pub progress_threshold_ms: u64,
    pub created_at: DateTime<Utc>,
    pub cached_at: Option<DateTime<Utc>>,
}

impl PageRecord {
    pub fn entry(&self) -> HistoryEntry {
        HistoryEntry {
            key: self.key.clone(),
            rev: self.rev.clone(),
            title: self.title.clone(),
            scroll_x: self.scroll_x,
            scroll_y: self.scroll_y,
            targets: self.targets.clone(),
        }
    }
}

/// Partial update applied by [`SessionStore::patch`](crate::store::SessionStore::patch).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagePatch {
    pub rev: Option<Key>,
    pub kind: Option<VisitKind>,
    pub cacheable: Option<bool>,
    pub history: Option<bool>,
    pub targets: Option<Vec<String>>,
    pub scroll: Option<(f64, f64)>,
    pub title: Option<String>,
    /// Replacement document; re-extracts the title.
    pub document: Option<String>,
}

impl PagePatch {
    pub fn scroll(x: f64, y: f64) -> Self {
        Self { scroll: Some((x, y)), ..Default::default() }
    }

    pub fn kind(kind: VisitKind) -> Self {
        Self { kind: Some(kind), ..Default::default() }
    }
}

/// Minimal projection of a record written to the platform history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub key: Key,
    pub rev: Key,
    pub title: String,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub targets: Vec<String>,
}

impl HistoryEntry {
    /// Structured state for platforms that store JSON alongside entries.
    pub fn to_state(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Reads back a state object, `None` when it was not written by a session.
    pub fn from_state(state: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(state.clone()).ok()
    }
}
