//! Unified error types for pagewarp.
//!
//! Only genuine failures live here. Outcomes that are part of normal
//! operation (a link that is not navigable, a vetoed fetch, an aborted
//! request, a key that is already in transit) are modelled as values by the
//! components that produce them.

use crate::location::Key;

/// Unified error type for the navigation session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an unparsable origin).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The transport failed before a response was received.
    #[error("TRANSPORT_ERROR: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("HTTP_ERROR: status {status} for {key}")]
    HttpStatus { key: Key, status: u16 },

    /// Response body exceeded the configured limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    TooLarge(String),

    /// No page record exists for the key.
    #[error("MISSING_RECORD: {0}")]
    MissingRecord(Key),

    /// The page record exists but owns no usable snapshot.
    #[error("MISSING_SNAPSHOT: {0}")]
    MissingSnapshot(Key),

    /// Configuration could not be loaded or failed validation.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl Error {
    /// Whether the failure came from the network layer.
    ///
    /// Network failures are never retried; callers degrade to a full
    /// navigation instead.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::HttpStatus { .. } | Error::TooLarge(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MissingRecord(Key::from("/about"));
        assert!(err.to_string().contains("MISSING_RECORD"));
        assert!(err.to_string().contains("/about"));
    }

    #[test]
    fn test_http_status_display() {
        let err = Error::HttpStatus { key: Key::from("/x"), status: 503 };
        assert_eq!(err.to_string(), "HTTP_ERROR: status 503 for /x");
    }

    #[test]
    fn test_is_network() {
        assert!(Error::Transport("reset".into()).is_network());
        assert!(Error::HttpStatus { key: Key::from("/"), status: 500 }.is_network());
        assert!(Error::TooLarge("6MB".into()).is_network());
        assert!(!Error::MissingSnapshot(Key::from("/")).is_network());
    }
}
