//! Session configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PAGEWARP_*)
//! 2. TOML config file (if PAGEWARP_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::HashMap;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Session configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PAGEWARP_*)
/// 2. TOML config file (if PAGEWARP_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Region selectors swapped on render unless a link overrides them.
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,

    /// Whether fetched documents are written to the snapshot table.
    ///
    /// Set via PAGEWARP_CACHE environment variable.
    #[serde(default = "default_true")]
    pub cache: bool,

    /// Snapshot byte budget in megabytes. `0` disables eviction.
    ///
    /// Set via PAGEWARP_CACHE_LIMIT_MB environment variable.
    #[serde(default = "default_cache_limit_mb")]
    pub cache_limit_mb: u64,

    /// Debounce window for uncached back/forward navigations.
    #[serde(default = "default_pop_debounce_ms")]
    pub pop_debounce_ms: u64,

    /// Paths fetched in the background after the initial load.
    #[serde(default)]
    pub preload: Preload,

    #[serde(default)]
    pub hover: HoverConfig,

    #[serde(default)]
    pub intersect: IntersectConfig,

    #[serde(default)]
    pub proximity: ProximityConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub request: RequestConfig,
}

/// Which links the hover trigger watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HoverTrigger {
    /// Only links annotated for hover prefetching.
    #[default]
    Attribute,
    /// Every eligible same-origin link.
    Href,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoverConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub trigger: HoverTrigger,
    /// Delay between pointer-enter and the prefetch firing.
    #[serde(default = "default_hover_threshold_ms")]
    pub threshold_ms: u64,
}

impl Default for HoverConfig {
    fn default() -> Self {
        Self { enabled: true, trigger: HoverTrigger::Attribute, threshold_ms: default_hover_threshold_ms() }
    }
}

/// Options handed to the platform's visibility observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_root_margin")]
    pub root_margin: String,
    #[serde(default)]
    pub threshold: f64,
}

impl Default for IntersectConfig {
    fn default() -> Self {
        Self { enabled: true, root_margin: default_root_margin(), threshold: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Pixels added on every side of a link's bounding box.
    #[serde(default = "default_proximity_distance")]
    pub distance: f64,
    /// Delay between entering a box and the prefetch firing.
    #[serde(default = "default_proximity_threshold_ms")]
    pub threshold_ms: u64,
    /// Quiet period after a pointer move that hit no box.
    #[serde(default = "default_proximity_throttle_ms")]
    pub throttle_ms: u64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            distance: default_proximity_distance(),
            threshold_ms: default_proximity_threshold_ms(),
            throttle_ms: default_proximity_throttle_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// When off, new records get a zero progress threshold unless the link
    /// sets one.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_progress_threshold_ms")]
    pub threshold_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { enabled: true, threshold_ms: default_progress_threshold_ms() }
    }
}

/// Transport-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Drive each request on its own task (`true`) or on the caller's task.
    #[serde(default = "default_true")]
    pub async_requests: bool,

    /// Request timeout in milliseconds.
    ///
    /// Set via PAGEWARP_REQUEST__TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes accepted per response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            async_requests: true,
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl RequestConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Background fetches issued once the initial page is cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Preload {
    /// Fetched regardless of the landing page.
    List(Vec<String>),
    /// Landing page key to the paths worth fetching from it.
    ByPage(HashMap<String, Vec<String>>),
}

impl Preload {
    /// Paths to preload when the session lands on `key`.
    pub fn paths_for(&self, key: &str) -> Vec<String> {
        match self {
            Preload::List(paths) => paths.iter().filter(|p| p.as_str() != key).cloned().collect(),
            Preload::ByPage(map) => map.get(key).cloned().unwrap_or_default(),
        }
    }
}

impl Default for Preload {
    fn default() -> Self {
        Preload::List(Vec::new())
    }
}

fn default_targets() -> Vec<String> {
    vec!["body".into()]
}

fn default_cache_limit_mb() -> u64 {
    50
}

fn default_pop_debounce_ms() -> u64 {
    300
}

fn default_hover_threshold_ms() -> u64 {
    250
}

fn default_root_margin() -> String {
    "0px 0px 0px 0px".into()
}

fn default_proximity_distance() -> f64 {
    75.0
}

fn default_proximity_threshold_ms() -> u64 {
    250
}

fn default_proximity_throttle_ms() -> u64 {
    500
}

fn default_progress_threshold_ms() -> u64 {
    500
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    "pagewarp/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            cache: true,
            cache_limit_mb: default_cache_limit_mb(),
            pop_debounce_ms: default_pop_debounce_ms(),
            preload: Preload::default(),
            hover: HoverConfig::default(),
            intersect: IntersectConfig::default(),
            proximity: ProximityConfig::default(),
            progress: ProgressConfig::default(),
            request: RequestConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Snapshot byte budget, `None` when eviction is disabled.
    pub fn cache_limit_bytes(&self) -> Option<u64> {
        (self.cache_limit_mb > 0).then(|| self.cache_limit_mb * 1024 * 1024)
    }

    pub fn pop_debounce(&self) -> Duration {
        Duration::from_millis(self.pop_debounce_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PAGEWARP_`
    /// 2. TOML file from `PAGEWARP_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PAGEWARP_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PAGEWARP_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
