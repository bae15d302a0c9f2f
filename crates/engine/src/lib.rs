//! Navigation session engine.
//!
//! [`Session`] is the entry point: it resolves link candidates to canonical
//! keys, serves them from the session cache or fetches them once, renders
//! through the [`platform`] seams and keeps history in step.

pub mod headless;
pub mod history;
pub mod platform;
pub mod prefetch;
pub mod render;
pub mod session;
pub mod visit;

#[cfg(test)]
mod testing;

pub use headless::{Headless, HeadlessDocument, HeadlessViewport, MemoryHistory};
pub use history::HistoryReconciler;
pub use platform::{ContentPatcher, History, Platform, ScriptEvaluator, Viewport};
pub use prefetch::{Candidate, Prefetched, Rect};
pub use render::{Rendered, Renderer};
pub use session::{Clear, Session, Summary};
pub use visit::{Acquired, Navigation, VisitState, Visits};
