//! Document inspection helpers.

use scraper::{Html, Selector};

/// Text of the document's `<title>`, trimmed. Empty when absent.
pub fn title(document: &str) -> String {
    let html = Html::parse_document(document);
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    html.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_extracted() {
        assert_eq!(title("<html><head><title>About</title></head><body></body></html>"), "About");
    }

    #[test]
    fn test_title_whitespace_collapsed() {
        assert_eq!(title("<title>\n  Docs  |\n Guide </title>"), "Docs | Guide");
    }

    #[test]
    fn test_missing_title() {
        assert_eq!(title("<p>no head</p>"), "");
        assert_eq!(title(""), "");
    }
}
