//! Client code for pagewarp.
//!
//! This crate provides the page transport, the fetch coordinator that
//! deduplicates in-flight requests, and link harvesting shared by the engine
//! and CLI.

pub mod coordinator;
pub mod extract;
pub mod fetch;

pub use coordinator::{FetchCoordinator, Fetched};
pub use extract::{Link, extract_links, link_attributes};
pub use fetch::{HttpTransport, MemoryTransport, Request, Response, Transport, TransportError};
