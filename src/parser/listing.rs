use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::{absolute_url, element_text, page_title};
use crate::model::{FacilityLink, StateLink, UNKNOWN};

static CATEGORY_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.mw-category-group a").unwrap());
static HEADING_OR_LIST: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2, ul").unwrap());
static LIST_ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Section labels that never hold facility lists.
const SKIPPED_SECTIONS: &[&str] = &["contents", "navigation"];

/// State links from the country category page.
pub fn parse_state_index(html: &str, base_url: &str) -> Vec<StateLink> {
    let doc = Html::parse_document(html);
    doc.select(&CATEGORY_LINK)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let name = element_text(a).trim().to_string();
            if name.is_empty() {
                return None;
            }
            Some(StateLink {
                name,
                url: absolute_url(base_url, href),
            })
        })
        .collect()
}

/// One row per list item under each content section of a state page.
///
/// Each `h2` is paired with the first `ul` that follows it before the next
/// `h2`; the heading text becomes the facility type.
pub fn parse_state_listing(html: &str, base_url: &str) -> Vec<FacilityLink> {
    let doc = Html::parse_document(html);
    let state = page_title(&doc).unwrap_or_else(|| UNKNOWN.to_string());

    let mut rows = Vec::new();
    let mut open_section: Option<String> = None;

    for el in doc.select(&HEADING_OR_LIST) {
        if el.value().name() == "h2" {
            open_section = Some(element_text(el).trim().to_string());
            continue;
        }
        let Some(label) = open_section.take() else {
            continue;
        };
        if is_skipped_section(&label) {
            continue;
        }

        for li in el.select(&LIST_ITEM) {
            let url = li
                .select(&ANCHOR)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| absolute_url(base_url, href));
            rows.push(FacilityLink {
                state: state.clone(),
                facility_type: label.clone(),
                name: element_text(li).trim().to_string(),
                url,
            });
        }
    }

    rows
}

fn is_skipped_section(label: &str) -> bool {
    let lower = label.to_lowercase();
    SKIPPED_SECTIONS.iter().any(|s| lower.contains(s))
}

// ── Tests ──
