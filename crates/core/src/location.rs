//! Canonical keys and link resolution.
//!
//! Every lookup in the session (cache, in-flight registry, prefetch timers)
//! is keyed by a [`Key`]: the same-origin path plus query of a link with the
//! fragment stripped. [`Resolver`] turns a raw href or [`LinkElement`] into a
//! key, or reports why the link is not navigable.
//!
//! [`LinkElement`]: crate::link::LinkElement

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::link::{LinkAttributes, LinkRef};
use crate::page::VisitKind;

/// Canonical identity of a page within the session origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Key for a parsed same-origin URL: path plus non-empty query.
    pub fn from_url(url: &Url) -> Self {
        let mut key = url.path().to_string();
        match url.query() {
            Some(query) if !query.is_empty() => {
                key.push('?');
                key.push_str(query);
            }
            _ => {}
        }
        Key(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path component without the query.
    pub fn path(&self) -> &str {
        self.0.split_once('?').map_or(self.0.as_str(), |(path, _)| path)
    }
}

/// Wraps a string that is already in canonical form (e.g. a location
/// reported by the platform).
impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Why a candidate cannot be intercepted.
///
/// Not an error: the caller lets the platform handle the link natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotNavigable {
    Empty,
    CrossOrigin,
    Fragment,
    Disabled,
    UnsupportedScheme,
    Malformed,
}

impl NotNavigable {
    pub fn reason(&self) -> &'static str {
        match self {
            NotNavigable::Empty => "empty href",
            NotNavigable::CrossOrigin => "cross-origin link",
            NotNavigable::Fragment => "fragment-only link",
            NotNavigable::Disabled => "link disabled",
            NotNavigable::UnsupportedScheme => "unsupported scheme",
            NotNavigable::Malformed => "malformed url",
        }
    }
}

impl fmt::Display for NotNavigable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// The page origin links are resolved against.
///
/// Site identity is the host with any leading `www.` removed, plus the
/// explicit port. The scheme does not participate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    url: Url,
    site: String,
}

impl Origin {
    /// Parse an origin such as `https://example.com` or `example.com:8080`.
    ///
    /// Defaults the scheme to `https://` and drops path, query and fragment.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("empty origin".into()));
        }

        let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
        let mut url = Url::parse(&url_str).map_err(|e| Error::InvalidInput(format!("origin {trimmed}: {e}")))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Error::InvalidInput(format!("unsupported origin scheme: {scheme}"))),
        }

        let site = match url.host_str() {
            Some(host) => strip_www(&host.to_ascii_lowercase()).to_string(),
            None => return Err(Error::InvalidInput(format!("origin has no host: {trimmed}"))),
        };

        url.set_path("/");
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { url, site })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Host without a leading `www.`.
    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Absolute URL for a key on this origin.
    pub fn join(&self, key: &Key) -> Result<Url, Error> {
        self.url.join(key.as_str()).map_err(|e| Error::InvalidInput(format!("key {key}: {e}")))
    }

    fn is_same_site(&self, url: &Url) -> bool {
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return false,
        };
        strip_www(&host) == self.site && url.port() == self.url.port()
    }

    /// Whether `href` begins with this origin's host (with or without `www.`)
    /// and no scheme.
    fn is_bare_host(&self, href: &str) -> bool {
        let lower = href.to_ascii_lowercase();
        let rest = strip_www(&lower);
        match rest.strip_prefix(self.site.as_str()) {
            Some(tail) => tail.is_empty() || tail.starts_with(['/', '?', '#', ':']),
            None => false,
        }
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Scheme of `href` when it has one, e.g. `mailto` for `mailto:a@b`.
fn scheme_of(href: &str) -> Option<&str> {
    let end = href.find([':', '/', '?', '#'])?;
    if !href[end..].starts_with(':') || end == 0 {
        return None;
    }
    let scheme = &href[..end];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    (first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')))
        .then_some(scheme)
}

/// A resolved navigation target: key, predecessor and link overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub key: Key,
    pub rev: Key,
    pub kind: VisitKind,
    pub attrs: LinkAttributes,
}

/// Resolves link candidates against the session origin.
#[derive(Debug, Clone)]
pub struct Resolver {
    origin: Origin,
}

impl Resolver {
    pub fn new(origin: Origin) -> Self {
        Self { origin }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Canonical key for `link`, relative to the `current` location.
    pub fn key<'a>(&self, link: impl Into<LinkRef<'a>>, current: &Key) -> Result<Key, NotNavigable> {
        let link = link.into();
        if link.attrs().is_some_and(|attrs| attrs.disabled) {
            return Err(NotNavigable::Disabled);
        }
        self.resolve_href(link.href(), current)
    }

    /// Resolve `link` into a [`Route`] whose predecessor is `current`.
    pub fn route<'a>(
        &self, link: impl Into<LinkRef<'a>>, current: &Key, kind: VisitKind,
    ) -> Result<Route, NotNavigable> {
        let link = link.into();
        let key = self.key(link, current)?;
        let attrs = link.attrs().cloned().unwrap_or_default();
        Ok(Route { key, rev: current.clone(), kind, attrs })
    }

    pub fn is_navigable<'a>(&self, link: impl Into<LinkRef<'a>>, current: &Key) -> bool {
        self.key(link, current).is_ok()
    }

    fn resolve_href(&self, href: &str, current: &Key) -> Result<Key, NotNavigable> {
        let href = href.trim();
        if href.is_empty() {
            return Err(NotNavigable::Empty);
        }
        if href.starts_with('#') {
            return Err(NotNavigable::Fragment);
        }

        let url = if let Some(rest) = href.strip_prefix("//") {
            Url::parse(&format!("{}://{rest}", self.origin.scheme())).map_err(|_| NotNavigable::Malformed)?
        } else if self.origin.is_bare_host(href) {
            Url::parse(&format!("{}://{href}", self.origin.scheme())).map_err(|_| NotNavigable::Malformed)?
        } else if let Some(scheme) = scheme_of(href) {
            if !matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https") {
                return Err(NotNavigable::UnsupportedScheme);
            }
            Url::parse(href).map_err(|_| NotNavigable::Malformed)?
        } else if href.starts_with("www.") {
            // www-prefixed host that is not ours
            return Err(NotNavigable::CrossOrigin);
        } else {
            let base = self.origin.url().join(current.as_str()).map_err(|_| NotNavigable::Malformed)?;
            base.join(href).map_err(|_| NotNavigable::Malformed)?
        };

        if !self.origin.is_same_site(&url) {
            return Err(NotNavigable::CrossOrigin);
        }

        Ok(Key::from_url(&url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkElement;

    fn resolver() -> Resolver {
        Resolver::new(Origin::parse("https://example.com").unwrap())
    }

    #[test]
    fn test_equivalent_forms_share_a_key() {
        let r = resolver();
        let current = Key::from("/docs/intro");
        let forms = [
            "https://example.com/about?x=1",
            "https://www.example.com/about?x=1#top",
            "http://EXAMPLE.com/about?x=1",
            "//example.com/about?x=1",
            "//www.example.com/about?x=1",
            "www.example.com/about?x=1",
            "example.com/about?x=1",
            "/about?x=1",
            "/about?x=1#team",
        ];
        for form in forms {
            assert_eq!(r.key(form, &current).unwrap(), Key::from("/about?x=1"), "form {form}");
        }
    }

    #[test]
    fn test_query_only_resolves_against_current_path() {
        let r = resolver();
        assert_eq!(r.key("?x=1", &Key::from("/about")).unwrap(), Key::from("/about?x=1"));
        assert_eq!(r.key("?page=2", &Key::from("/blog?page=1")).unwrap(), Key::from("/blog?page=2"));
    }

    #[test]
    fn test_relative_path_and_empty_query() {
        let r = resolver();
        assert_eq!(r.key("guide", &Key::from("/docs/intro")).unwrap(), Key::from("/docs/guide"));
        assert_eq!(r.key("/a?", &Key::from("/")).unwrap(), Key::from("/a"));
        assert_eq!(r.key("https://example.com", &Key::from("/x")).unwrap(), Key::from("/"));
    }

    #[test]
    fn test_not_navigable() {
        let r = resolver();
        let current = Key::from("/");
        assert_eq!(r.key("", &current), Err(NotNavigable::Empty));
        assert_eq!(r.key("   ", &current), Err(NotNavigable::Empty));
        assert_eq!(r.key("#section", &current), Err(NotNavigable::Fragment));
        assert_eq!(r.key("mailto:team@example.com", &current), Err(NotNavigable::UnsupportedScheme));
        assert_eq!(r.key("javascript:void(0)", &current), Err(NotNavigable::UnsupportedScheme));
        assert_eq!(r.key("https://other.com/about", &current), Err(NotNavigable::CrossOrigin));
        assert_eq!(r.key("https://example.com.evil.io/", &current), Err(NotNavigable::CrossOrigin));
        assert_eq!(r.key("https://example.com:8443/", &current), Err(NotNavigable::CrossOrigin));
        assert_eq!(r.key("www.other.com/a", &current), Err(NotNavigable::CrossOrigin));
        assert_eq!(r.key("https://exa mple.com/", &current), Err(NotNavigable::Malformed));
    }

    #[test]
    fn test_disabled_element() {
        let r = resolver();
        let mut link = LinkElement::new("/about");
        assert!(r.is_navigable(&link, &Key::from("/")));
        link.attrs.disabled = true;
        assert_eq!(r.key(&link, &Key::from("/")), Err(NotNavigable::Disabled));
    }

    #[test]
    fn test_route_carries_rev_and_attrs() {
        let r = resolver();
        let mut link = LinkElement::new("/pricing");
        link.attrs.targets = vec!["main".into()];
        let route = r.route(&link, &Key::from("/"), VisitKind::Visit).unwrap();
        assert_eq!(route.key, Key::from("/pricing"));
        assert_eq!(route.rev, Key::from("/"));
        assert_eq!(route.attrs.targets, vec!["main".to_string()]);
    }

    #[test]
    fn test_origin_parse() {
        let origin = Origin::parse("www.Example.com/some/path?q").unwrap();
        assert_eq!(origin.site(), "example.com");
        assert_eq!(origin.url().as_str(), "https://www.example.com/");
        assert!(Origin::parse("").is_err());
        assert!(Origin::parse("ftp://example.com").is_err());
    }

    #[test]
    fn test_key_path() {
        assert_eq!(Key::from("/a/b?c=1").path(), "/a/b");
        assert_eq!(Key::from("/a").path(), "/a");
    }
}
