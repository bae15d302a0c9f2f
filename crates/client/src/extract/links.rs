//! Link harvesting from HTML documents.
//!
//! Anchors are turned into [`LinkElement`]s. Session directives are read from
//! `data-pw-*` attributes:
//!
//! | attribute | effect |
//! |---|---|
//! | `data-pw-disable` | never intercept |
//! | `data-pw-cache="false\|clear\|reset"` | cache directive |
//! | `data-pw-target="main, nav"` | replacement regions |
//! | `data-pw-history="false"` | replace instead of push |
//! | `data-pw-scroll="y"` or `"x,y"` | scroll position after render |
//! | `data-pw-hover`, `data-pw-intersect` | opt in (`"false"` opts out) |
//! | `data-pw-proximity` | opt in; a number sets the distance |
//! | `data-pw-threshold` | hover/proximity delay in ms |
//! | `data-pw-progress` | progress threshold in ms |

use scraper::{Html, Selector};
use std::collections::HashSet;

use pagewarp_core::{CacheMode, LinkAttributes, LinkElement};

const PREFIX: &str = "data-pw-";

/// A harvested anchor with its text.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Link {
    /// Link text content
    pub text: String,
    pub element: LinkElement,
}

/// Extract anchors from an HTML document.
///
/// Hrefs are kept as written; resolution against the session origin happens
/// when the link is used. Duplicates (by href) are removed, keeping the first.
pub fn extract_links(html: &str) -> Vec<Link> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let href = match element.value().attr("href") {
            Some(h) => h.trim().to_string(),
            None => continue,
        };

        if !seen.insert(href.clone()) {
            continue;
        }

        let attrs = link_attributes(element.value().attrs());
        let text = element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ");
        let text = if text.is_empty() { "[link]".to_string() } else { text };

        links.push(Link { text, element: LinkElement::with_attrs(href, attrs) });
    }

    links
}

/// Parse `data-pw-*` attributes into link overrides. Other attributes and
/// unparsable values are ignored.
pub fn link_attributes<'a>(attrs: impl IntoIterator<Item = (&'a str, &'a str)>) -> LinkAttributes {
    let mut out = LinkAttributes::default();

    for (name, value) in attrs {
        let Some(directive) = name.strip_prefix(PREFIX) else {
            continue;
        };
        let value = value.trim();

        match directive {
            "disable" => out.disabled = value != "false",
            "cache" => {
                out.cache = match value {
                    "false" => Some(CacheMode::Disabled),
                    "clear" => Some(CacheMode::Clear),
                    "reset" => Some(CacheMode::Reset),
                    "" | "true" => Some(CacheMode::Enabled),
                    other => {
                        tracing::debug!(value = other, "unknown cache directive");
                        None
                    }
                }
            }
            "target" => {
                out.targets = value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
            }
            "history" => out.history = Some(value != "false"),
            "scroll" => out.scroll = parse_scroll(value),
            "hover" => out.hover = Some(value != "false"),
            "intersect" => out.intersect = Some(value != "false"),
            "proximity" => {
                out.proximity = Some(value != "false");
                if let Ok(distance) = value.parse::<f64>() {
                    out.proximity_distance = Some(distance);
                }
            }
            "threshold" => out.threshold_ms = value.parse().ok(),
            "progress" => out.progress_threshold_ms = value.parse().ok(),
            _ => {}
        }
    }

    out
}

fn parse_scroll(value: &str) -> Option<(f64, f64)> {
    match value.split_once(',') {
        Some((x, y)) => Some((x.trim().parse().ok()?, y.trim().parse().ok()?)),
        None => Some((0.0, value.parse().ok()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_links_basic() {
        let html = r#"
            <html>
                <body>
                    <a href="/about">About</a>
                    <a href="contact">Contact</a>
                </body>
            </html>
        "#;

        let links = extract_links(html);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].text, "About");
        assert_eq!(links[0].element.href, "/about");
        assert_eq!(links[1].element.href, "contact");
        assert_eq!(links[1].element.attrs, LinkAttributes::default());
    }

    #[test]
    fn test_extract_links_duplicate() {
        let html = r#"
            <a href="/docs">First</a>
            <a href="/docs">Second</a>
        "#;

        let links = extract_links(html);

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].text, "First");
    }

    #[test]
    fn test_extract_links_empty_text() {
        let links = extract_links(r#"<a href="/x">   </a>"#);
        assert_eq!(links[0].text, "[link]");
    }

    #[test]
    fn test_extract_links_multiline_text() {
        let html = r#"
            <a href="/x">
                Line 1
                Line 2
            </a>
        "#;

        let links = extract_links(html);
        assert_eq!(links[0].text, "Line 1 Line 2");
    }

    #[test]
    fn test_extract_directives() {
        let html = r#"
            <a href="/pricing" data-pw-hover data-pw-threshold="100" data-pw-target="main, nav">Pricing</a>
            <a href="/blog" data-pw-proximity="40" data-pw-cache="false">Blog</a>
            <a href="/legal" data-pw-disable>Legal</a>
            <a href="/feed" data-pw-intersect data-pw-history="false" data-pw-scroll="0,120">Feed</a>
        "#;

        let links = extract_links(html);
        assert_eq!(links.len(), 4);

        let pricing = &links[0].element.attrs;
        assert_eq!(pricing.hover, Some(true));
        assert_eq!(pricing.threshold_ms, Some(100));
        assert_eq!(pricing.targets, vec!["main".to_string(), "nav".to_string()]);

        let blog = &links[1].element.attrs;
        assert_eq!(blog.proximity, Some(true));
        assert_eq!(blog.proximity_distance, Some(40.0));
        assert_eq!(blog.cache, Some(CacheMode::Disabled));

        assert!(links[2].element.attrs.disabled);

        let feed = &links[3].element.attrs;
        assert_eq!(feed.intersect, Some(true));
        assert_eq!(feed.history, Some(false));
        assert_eq!(feed.scroll, Some((0.0, 120.0)));
    }

    #[test]
    fn test_link_attributes_opt_out_and_garbage() {
        let attrs = link_attributes([("data-pw-hover", "false"), ("data-pw-threshold", "soon"), ("class", "btn")]);
        assert_eq!(attrs.hover, Some(false));
        assert_eq!(attrs.threshold_ms, None);
    }

    #[test]
    fn test_extract_links_no_links() {
        assert!(extract_links("<p>No links here</p>").is_empty());
    }
}
