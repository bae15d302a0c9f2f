//! Candidate discovery from fetched documents.

pub mod links;

pub use links::{Link, extract_links, link_attributes};
