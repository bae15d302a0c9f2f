//! Page transport.
//!
//! ### Request Marking
//! Every request carries `X-Pagewarp: true`, the session id in
//! `X-Pagewarp-Session` and `X-Requested-With: XMLHttpRequest` so servers can
//! answer with a partial document.
//!
//! ### Implementations
//! - [`HttpTransport`]: reqwest client with redirect, byte and time limits.
//! - [`MemoryTransport`]: scripted routes for tests and offline drivers.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use pagewarp_core::{Error, Key, VisitKind};

pub use http::HttpTransport;
pub use memory::MemoryTransport;

pub const MARKER_HEADER: &str = "X-Pagewarp";
pub const SESSION_HEADER: &str = "X-Pagewarp-Session";
pub const REQUESTED_WITH_HEADER: &str = "X-Requested-With";

/// A GET request for one page.
#[derive(Debug, Clone)]
pub struct Request {
    pub key: Key,
    pub url: Url,
    pub kind: VisitKind,
    pub headers: Vec<(&'static str, String)>,
}

impl Request {
    pub fn new(key: Key, url: Url, kind: VisitKind, session: &str) -> Self {
        let headers = vec![
            (MARKER_HEADER, "true".to_string()),
            (SESSION_HEADER, session.to_string()),
            (REQUESTED_WITH_HEADER, "XMLHttpRequest".to_string()),
        ];
        Self { key, url, kind, headers }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct Response {
    /// The final URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub body: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl Response {
    /// Bytes transferred, as counted by the session memory.
    pub fn len(&self) -> u64 {
        self.body.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport failures. Cloneable so one failure can be reported to every
/// caller waiting on the same request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    /// `bytes` is the length of the error body that came back with it.
    #[error("status {status}")]
    Status { status: u16, bytes: u64 },

    #[error("{size} bytes exceeds {limit}")]
    TooLarge { size: u64, limit: u64 },
}

impl TransportError {
    /// Bytes that arrived before the request failed.
    pub fn bytes(&self) -> u64 {
        match self {
            TransportError::Status { bytes, .. } => *bytes,
            _ => 0,
        }
    }

    pub fn into_error(self, key: &Key) -> Error {
        match self {
            TransportError::Network(msg) => Error::Transport(msg),
            TransportError::Status { status, .. } => Error::HttpStatus { key: key.clone(), status },
            TransportError::TooLarge { size, limit } => Error::TooLarge(format!("{size} bytes exceeds {limit}")),
        }
    }
}

/// Issues page requests. Aborting is done by dropping the returned future.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: Request) -> Result<Response, TransportError>;
}
