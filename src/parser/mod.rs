pub mod detail;
pub mod listing;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

static TITLE_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1#firstHeading").unwrap());

/// Text of an element with `<br>` rendered as a newline.
pub(crate) fn element_text(el: ElementRef) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

/// Trimmed text of the page's `h1#firstHeading`, if present and non-empty.
pub(crate) fn page_title(doc: &Html) -> Option<String> {
    doc.select(&TITLE_HEADING)
        .next()
        .map(|h| element_text(h).trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolve a wiki-relative href against the site root.
pub fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), href)
    }
}
