use std::sync::LazyLock;

use regex::Regex;

use crate::model::ALT_NAME_SLOTS;

pub const MIN_YEAR: i32 = 1700;
pub const MAX_YEAR: i32 = 2025;

static EDIT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[\s*edit\s*\]").unwrap());

/// Leading four characters as a year in `[MIN_YEAR, MAX_YEAR]`.
///
/// `"1910s"` and `"1874-1993"` both reduce to their first year.
pub fn normalize_year(value: &str) -> Option<i32> {
    let head: String = value.trim().chars().take(4).collect();
    if head.len() != 4 || !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = head.parse().ok()?;
    (MIN_YEAR..=MAX_YEAR).contains(&year).then_some(year)
}

/// First token with thousands separators removed, as a positive integer.
///
/// `"1,234 (peak)"` is 1234; zero, negatives and words are absent.
/// Values above `u32::MAX` are treated as absent too.
pub fn normalize_count(value: &str) -> Option<u32> {
    let token = value.split_whitespace().next()?.replace(',', "");
    let n: u32 = token.parse().ok()?;
    (n > 0).then_some(n)
}

/// Strip `[edit]` markers and title-case each word.
pub fn normalize_type(value: &str) -> Option<String> {
    let cleaned = EDIT_MARKER.replace_all(value, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(title_case(cleaned))
    }
}

/// Uppercase letters that follow a non-letter, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

/// Split a `" | "`-joined name list into fixed slots.
///
/// Names past the last slot are dropped without a flag.
pub fn split_alt_names(value: Option<&str>) -> [Option<String>; ALT_NAME_SLOTS] {
    let mut slots: [Option<String>; ALT_NAME_SLOTS] = Default::default();
    let Some(value) = value else {
        return slots;
    };

    let names = value
        .trim_matches(|c| c == ' ' || c == '|')
        .split('|')
        .map(str::trim)
        .filter(|n| !n.is_empty());
    for (slot, name) in slots.iter_mut().zip(names) {
        *slot = Some(name.to_string());
    }
    slots
}

/// Text before the first comma of a location.
pub fn city_of(location: Option<&str>) -> Option<String> {
    let city = location?.split(',').next()?.trim();
    (!city.is_empty()).then(|| city.to_string())
}

pub fn mentions_kirkbride(texts: &[&str]) -> bool {
    texts.iter().any(|t| t.to_lowercase().contains("kirkbride"))
}

/// The wiki marks links to pages that do not exist with `redlink=1`.
pub fn is_broken_link(url: &str) -> bool {
    url.to_lowercase().contains("redlink")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_valid_year_is_unchanged() {
        for y in MIN_YEAR..=MAX_YEAR {
            assert_eq!(normalize_year(&y.to_string()), Some(y));
        }
    }

    #[test]
    fn invalid_years_are_absent() {
        for v in ["", "   ", "1699", "2026", "9999", "0000", "unknown", "c. 1910", "187", "-1900", "12345"] {
            assert_eq!(normalize_year(v), None, "{v:?}");
        }
    }

    #[test]
    fn year_reduces_to_leading_digits() {
        assert_eq!(normalize_year(" 1910s "), Some(1910));
        assert_eq!(normalize_year("1874-1993"), Some(1874));
        assert_eq!(normalize_year("1910.0"), Some(1910));
    }

    #[test]
    fn counts() {
        assert_eq!(normalize_count("1,234 (peak)"), Some(1234));
        assert_eq!(normalize_count("1500"), Some(1500));
        assert_eq!(normalize_count(" 2,500 patients"), Some(2500));
        for v in ["0", "-5", "many", "", "about 300", "1.5"] {
            assert_eq!(normalize_count(v), None, "{v:?}");
        }
    }

    #[test]
    fn counts_beyond_u32_are_absent() {
        assert_eq!(normalize_count("4,294,967,295"), Some(u32::MAX));
        assert_eq!(normalize_count("4,294,967,296"), None);
    }

    #[test]
    fn type_labels() {
        assert_eq!(
            normalize_type("State Hospitals[edit]").as_deref(),
            Some("State Hospitals")
        );
        assert_eq!(
            normalize_type("county poor farms [ Edit ]").as_deref(),
            Some("County Poor Farms")
        );
        assert_eq!(normalize_type("VA HOSPITALS").as_deref(), Some("Va Hospitals"));
        assert_eq!(normalize_type("[edit]"), None);
    }

    #[test]
    fn alt_names_fill_then_truncate() {
        let slots = split_alt_names(Some(" | A | B |  | C | "));
        assert_eq!(slots[0].as_deref(), Some("A"));
        assert_eq!(slots[2].as_deref(), Some("C"));
        assert_eq!(slots[3], None);
        assert_eq!(slots[4], None);

        let seven = split_alt_names(Some("1 | 2 | 3 | 4 | 5 | 6 | 7"));
        assert_eq!(seven[4].as_deref(), Some("5"));
        assert_eq!(seven.iter().flatten().count(), ALT_NAME_SLOTS);

        assert_eq!(split_alt_names(None), <[Option<String>; ALT_NAME_SLOTS]>::default());
    }

    #[test]
    fn city_is_first_location_part() {
        assert_eq!(city_of(Some("Athens, OH")).as_deref(), Some("Athens"));
        assert_eq!(city_of(Some("Traverse City")).as_deref(), Some("Traverse City"));
        assert_eq!(city_of(Some(", OH")), None);
        assert_eq!(city_of(None), None);
    }

    #[test]
    fn kirkbride_any_case_any_field() {
        assert!(mentions_kirkbride(&["", "", "a KIRKBRIDE plan building"]));
        assert!(mentions_kirkbride(&["Kirkbride Plan", "", ""]));
        assert!(!mentions_kirkbride(&["Cottage Plan", "Gothic", "text"]));
        assert!(!mentions_kirkbride(&["", "", ""]));
    }

    #[test]
    fn redlinks() {
        assert!(is_broken_link(
            "https://www.asylumprojects.org/index.php?title=X&action=edit&redlink=1"
        ));
        assert!(!is_broken_link("https://www.asylumprojects.org/index.php/X"));
    }
}
