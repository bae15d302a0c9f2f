//! Core types and shared state for pagewarp.
//!
//! This crate provides:
//! - Layered session configuration
//! - Unified error types
//! - Canonical key resolution for link candidates
//! - The page/snapshot store and lifecycle event bus
//! - [`SessionContext`], the state shared by every session component

pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod events;
pub mod link;
pub mod location;
pub mod memory;
pub mod page;
pub mod store;

pub use config::{ConfigError, Preload, SessionConfig};
pub use context::SessionContext;
pub use error::Error;
pub use events::{Decision, Dispatch, Event, EventBus, EventKind, ListenerId};
pub use link::{CacheMode, LinkAttributes, LinkElement, LinkRef};
pub use location::{Key, NotNavigable, Origin, Resolver, Route};
pub use memory::{Memory, MemoryStats};
pub use page::{HistoryEntry, PagePatch, PageRecord, SnapshotId, VisitKind};
pub use store::{Committed, SessionStore};
