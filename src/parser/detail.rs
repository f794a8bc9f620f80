use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{element_text, page_title};
use crate::error::ParseError;
use crate::model::{
    FacilityLink, InfoboxFields, InfoboxKey, RawRecord, ALT_NAME_SEPARATOR,
};

static INFOBOX: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table.infobox").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CONTENT_PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#mw-content-text p").unwrap());

/// Two passes over a facility page: infobox key/values, then body paragraphs.
///
/// Fails only when the title heading is missing, which the fetcher treats
/// as a retryable bad render.
pub fn parse_detail(html: &str, link: &FacilityLink, url: &str) -> Result<RawRecord, ParseError> {
    let doc = Html::parse_document(html);
    let name = page_title(&doc).ok_or(ParseError::MissingHeading)?;

    Ok(RawRecord {
        name,
        url: url.to_string(),
        state: link.state.clone(),
        facility_type: Some(link.facility_type.clone()),
        infobox: parse_infobox(&doc),
        body: parse_body(&doc),
    })
}

fn parse_infobox(doc: &Html) -> InfoboxFields {
    let mut fields = InfoboxFields::default();
    let Some(table) = doc.select(&INFOBOX).next() else {
        return fields;
    };

    for row in table.select(&ROW) {
        let cells: Vec<ElementRef> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "th" | "td"))
            .collect();
        let [key_cell, value_cell] = cells.as_slice() else {
            continue;
        };

        let label = element_text(*key_cell);
        let Some(key) = InfoboxKey::from_label(&label) else {
            debug!(label = label.trim(), "Dropping infobox row");
            continue;
        };

        let raw = element_text(*value_cell);
        let value = if key == InfoboxKey::AlternateNames {
            join_alternate_names(&raw)
        } else {
            raw.trim().to_string()
        };
        if !value.is_empty() {
            fields.set(key, value);
        }
    }

    fields
}

/// Line breaks separate names inside the cell; rejoin them with one token.
fn join_alternate_names(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(ALT_NAME_SEPARATOR)
}

fn parse_body(doc: &Html) -> String {
    doc.select(&CONTENT_PARAGRAPH)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Tests ──
