//! Link candidates as seen by the session.
//!
//! A candidate is either a raw href string or an element-like descriptor
//! whose annotations have already been parsed into [`LinkAttributes`].

use serde::{Deserialize, Serialize};

/// Per-link cache directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    Enabled,
    /// Never write a snapshot for this record.
    Disabled,
    /// Wipe the whole store before navigating.
    Clear,
    /// Drop this key's record before navigating.
    Reset,
}

/// Configuration carried by an annotated link.
///
/// Every field is an override; `None`/empty means "inherit from the session
/// configuration".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkAttributes {
    /// Link explicitly opted out of interception.
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub cache: Option<CacheMode>,
    /// Replacement region selectors.
    #[serde(default)]
    pub targets: Vec<String>,
    /// `Some(false)` replaces the history entry instead of pushing.
    #[serde(default)]
    pub history: Option<bool>,
    #[serde(default)]
    pub scroll: Option<(f64, f64)>,
    #[serde(default)]
    pub hover: Option<bool>,
    #[serde(default)]
    pub proximity: Option<bool>,
    #[serde(default)]
    pub intersect: Option<bool>,
    /// Delay before a hover or proximity prefetch fires.
    #[serde(default)]
    pub threshold_ms: Option<u64>,
    #[serde(default)]
    pub proximity_distance: Option<f64>,
    #[serde(default)]
    pub progress_threshold_ms: Option<u64>,
}

impl LinkAttributes {
    /// Layer `overrides` on top of these attributes.
    pub fn merge(&self, overrides: &LinkAttributes) -> LinkAttributes {
        LinkAttributes {
            disabled: self.disabled || overrides.disabled,
            cache: overrides.cache.or(self.cache),
            targets: if overrides.targets.is_empty() { self.targets.clone() } else { overrides.targets.clone() },
            history: overrides.history.or(self.history),
            scroll: overrides.scroll.or(self.scroll),
            hover: overrides.hover.or(self.hover),
            proximity: overrides.proximity.or(self.proximity),
            intersect: overrides.intersect.or(self.intersect),
            threshold_ms: overrides.threshold_ms.or(self.threshold_ms),
            proximity_distance: overrides.proximity_distance.or(self.proximity_distance),
            progress_threshold_ms: overrides.progress_threshold_ms.or(self.progress_threshold_ms),
        }
    }
}

/// An anchor-like element descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkElement {
    pub href: String,
    #[serde(default)]
    pub attrs: LinkAttributes,
}

impl LinkElement {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into(), attrs: LinkAttributes::default() }
    }

    pub fn with_attrs(href: impl Into<String>, attrs: LinkAttributes) -> Self {
        Self { href: href.into(), attrs }
    }
}

/// Borrowed link candidate.
#[derive(Debug, Clone, Copy)]
pub enum LinkRef<'a> {
    Href(&'a str),
    Element(&'a LinkElement),
}

impl<'a> LinkRef<'a> {
    pub fn href(&self) -> &'a str {
        match self {
            LinkRef::Href(href) => href,
            LinkRef::Element(element) => &element.href,
        }
    }

    pub fn attrs(&self) -> Option<&'a LinkAttributes> {
        match self {
            LinkRef::Href(_) => None,
            LinkRef::Element(element) => Some(&element.attrs),
        }
    }
}

impl<'a> From<&'a str> for LinkRef<'a> {
    fn from(href: &'a str) -> Self {
        LinkRef::Href(href)
    }
}

impl<'a> From<&'a String> for LinkRef<'a> {
    fn from(href: &'a String) -> Self {
        LinkRef::Href(href)
    }
}

impl<'a> From<&'a LinkElement> for LinkRef<'a> {
    fn from(element: &'a LinkElement) -> Self {
        LinkRef::Element(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_overrides() {
        let base = LinkAttributes {
            targets: vec!["main".into()],
            history: Some(true),
            threshold_ms: Some(100),
            ..Default::default()
        };
        let overrides = LinkAttributes { cache: Some(CacheMode::Reset), history: Some(false), ..Default::default() };

        let merged = base.merge(&overrides);
        assert_eq!(merged.targets, vec!["main".to_string()]);
        assert_eq!(merged.cache, Some(CacheMode::Reset));
        assert_eq!(merged.history, Some(false));
        assert_eq!(merged.threshold_ms, Some(100));
        assert!(!merged.disabled);
    }

    #[test]
    fn test_link_ref_views() {
        let element = LinkElement::with_attrs("/a", LinkAttributes { disabled: true, ..Default::default() });
        let link = LinkRef::from(&element);
        assert_eq!(link.href(), "/a");
        assert!(link.attrs().is_some_and(|a| a.disabled));
        assert!(LinkRef::from("/b").attrs().is_none());
    }
}
