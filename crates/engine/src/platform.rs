//! Seams to the hosting platform.
//!
//! The engine never touches a document, history stack or viewport directly;
//! it goes through these traits. [`crate::headless`] provides in-memory
//! implementations.

use std::sync::Arc;

use async_trait::async_trait;

use pagewarp_core::{HistoryEntry, Key};

/// The platform navigation stack.
pub trait History: Send + Sync {
    fn push(&self, entry: &HistoryEntry);
    fn replace(&self, entry: &HistoryEntry);
    /// Session state stored on the current entry, if any.
    fn current(&self) -> Option<HistoryEntry>;
    /// Key of the location the platform is showing right now.
    fn location(&self) -> Key;
}

pub trait Viewport: Send + Sync {
    fn scroll_position(&self) -> (f64, f64);
    fn scroll_to(&self, x: f64, y: f64);
    /// Full, non-intercepted navigation.
    fn assign(&self, key: &Key);
}

/// Swaps one region of the live view with the same region of `document`.
pub trait ContentPatcher: Send + Sync {
    /// Returns `false` when the region could not be patched.
    fn patch(&self, target: &str, document: &str) -> bool;
}

/// Re-evaluates scripts and styles after a swap.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    /// Resolves once every blocking script has run.
    async fn evaluate(&self, document: &str);
}

#[derive(Clone)]
pub struct Platform {
    pub history: Arc<dyn History>,
    pub viewport: Arc<dyn Viewport>,
    pub patcher: Arc<dyn ContentPatcher>,
    pub evaluator: Arc<dyn ScriptEvaluator>,
}
