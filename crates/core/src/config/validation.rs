//! Configuration validation rules.
//!
//! This module provides validation logic for `SessionConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::SessionConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl SessionConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `targets` is empty, and
    /// `ConfigError::Invalid` if:
    /// - a target selector is blank
    /// - `request.timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `request.max_bytes` is 0 or exceeds 50MB
    /// - `request.user_agent` is empty
    /// - `proximity.distance` or `intersect.threshold` is out of range
    /// - `pop_debounce_ms` exceeds 10 seconds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::Missing {
                field: "targets".into(),
                hint: "at least one replacement selector such as \"body\" is required".into(),
            });
        }
        if self.targets.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid { field: "targets".into(), reason: "selectors must not be blank".into() });
        }

        if self.request.timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "request.timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.request.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "request.timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.request.max_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "request.max_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.request.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid {
                field: "request.max_bytes".into(),
                reason: "must not exceed 50MB".into(),
            });
        }

        if self.request.user_agent.is_empty() {
            return Err(ConfigError::Invalid {
                field: "request.user_agent".into(),
                reason: "must not be empty".into(),
            });
        }

        if !self.proximity.distance.is_finite() || self.proximity.distance < 0.0 {
            return Err(ConfigError::Invalid {
                field: "proximity.distance".into(),
                reason: "must be a non-negative number".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.intersect.threshold) {
            return Err(ConfigError::Invalid {
                field: "intersect.threshold".into(),
                reason: "must be between 0 and 1".into(),
            });
        }

        if self.pop_debounce_ms > 10_000 {
            return Err(ConfigError::Invalid {
                field: "pop_debounce_ms".into(),
                reason: "must not exceed 10 seconds".into(),
            });
        }

        if !self.cache && self.cache_limit_mb > 0 {
            tracing::debug!(
                cache_limit_mb = self.cache_limit_mb,
                "cache is disabled; cache_limit_mb has no effect"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IntersectConfig, ProximityConfig, RequestConfig};

    #[test]
    fn test_validate_default_config() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_targets() {
        let config = SessionConfig { targets: Vec::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Missing { field, .. }) if field == "targets"));
    }

    #[test]
    fn test_validate_blank_target() {
        let config = SessionConfig { targets: vec!["main".into(), "  ".into()], ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "targets"));
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config =
            SessionConfig { request: RequestConfig { timeout_ms: 50, ..Default::default() }, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "request.timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = SessionConfig {
            request: RequestConfig { timeout_ms: 301_000, ..Default::default() },
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "request.timeout_ms"));
    }

    #[test]
    fn test_validate_max_bytes_zero() {
        let config =
            SessionConfig { request: RequestConfig { max_bytes: 0, ..Default::default() }, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "request.max_bytes"));
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = SessionConfig {
            request: RequestConfig { user_agent: String::new(), ..Default::default() },
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "request.user_agent"));
    }

    #[test]
    fn test_validate_negative_distance() {
        let config = SessionConfig {
            proximity: ProximityConfig { distance: -1.0, ..Default::default() },
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "proximity.distance"));
    }

    #[test]
    fn test_validate_intersect_threshold_range() {
        let config = SessionConfig {
            intersect: IntersectConfig { threshold: 1.5, ..Default::default() },
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "intersect.threshold"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = SessionConfig {
            request: RequestConfig { max_bytes: 1, timeout_ms: 100, ..Default::default() },
            pop_debounce_ms: 0,
            ..Default::default()
        }; // minimum valid values
        assert!(config.validate().is_ok());
    }
}
