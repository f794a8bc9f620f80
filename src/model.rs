use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identity used for pages whose title heading could not be read.
pub const UNKNOWN: &str = "Unknown";

/// Number of alternate-name columns in the output. Extra names are dropped.
pub const ALT_NAME_SLOTS: usize = 5;

/// Separator written between alternate names inside one infobox value.
pub const ALT_NAME_SEPARATOR: &str = " | ";

// ── Links ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateLink {
    #[serde(rename = "State")]
    pub name: String,
    #[serde(rename = "State_URL")]
    pub url: String,
}

/// One list item from a state listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityLink {
    pub state: String,
    pub facility_type: String,
    pub name: String,
    pub url: Option<String>,
}

// ── Raw record ──

/// Infobox labels that are kept. Every other row is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoboxKey {
    Established,
    ConstructionBegan,
    Opened,
    Closed,
    CurrentStatus,
    BuildingStyle,
    ArchitectureStyle,
    AlternateNames,
    Location,
    PeakPopulation,
}

impl InfoboxKey {
    pub const ALL: [InfoboxKey; 10] = [
        Self::Established,
        Self::ConstructionBegan,
        Self::Opened,
        Self::Closed,
        Self::CurrentStatus,
        Self::BuildingStyle,
        Self::ArchitectureStyle,
        Self::AlternateNames,
        Self::Location,
        Self::PeakPopulation,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Established => "Established",
            Self::ConstructionBegan => "Construction Began",
            Self::Opened => "Opened",
            Self::Closed => "Closed",
            Self::CurrentStatus => "Current Status",
            Self::BuildingStyle => "Building Style",
            Self::ArchitectureStyle => "Architecture Style",
            Self::AlternateNames => "Alternate Names",
            Self::Location => "Location",
            Self::PeakPopulation => "Peak Patient Population",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(label))
    }
}

/// Allow-listed infobox values, copied verbatim (trimmed) from the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfoboxFields {
    pub established: Option<String>,
    pub construction_began: Option<String>,
    pub opened: Option<String>,
    pub closed: Option<String>,
    pub current_status: Option<String>,
    pub building_style: Option<String>,
    pub architecture_style: Option<String>,
    pub alternate_names: Option<String>,
    pub location: Option<String>,
    pub peak_population: Option<String>,
}

impl InfoboxFields {
    /// Later rows with the same key overwrite earlier ones.
    pub fn set(&mut self, key: InfoboxKey, value: String) {
        let slot = match key {
            InfoboxKey::Established => &mut self.established,
            InfoboxKey::ConstructionBegan => &mut self.construction_began,
            InfoboxKey::Opened => &mut self.opened,
            InfoboxKey::Closed => &mut self.closed,
            InfoboxKey::CurrentStatus => &mut self.current_status,
            InfoboxKey::BuildingStyle => &mut self.building_style,
            InfoboxKey::ArchitectureStyle => &mut self.architecture_style,
            InfoboxKey::AlternateNames => &mut self.alternate_names,
            InfoboxKey::Location => &mut self.location,
            InfoboxKey::PeakPopulation => &mut self.peak_population,
        };
        *slot = Some(value);
    }
}

/// One facility as scraped from its detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub name: String,
    pub url: String,
    pub state: String,
    pub facility_type: Option<String>,
    pub infobox: InfoboxFields,
    pub body: String,
}

impl RawRecord {
    /// Sentinel for a page that stayed unreadable after every retry.
    pub fn unavailable(link: &FacilityLink, url: &str) -> Self {
        RawRecord {
            name: UNKNOWN.to_string(),
            url: url.to_string(),
            state: link.state.clone(),
            facility_type: Some(link.facility_type.clone()),
            infobox: InfoboxFields::default(),
            body: String::new(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.name == UNKNOWN
    }
}

// ── Candidate extraction ──

/// Best-effort numeric fields guessed by the completion service.
///
/// Values stay textual here; validity is decided during reconciliation.
/// All six fields are required when parsing a completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CandidateExtraction {
    #[serde(rename = "year_opened_LLM", deserialize_with = "loose_value")]
    pub year_opened: Option<String>,
    #[serde(rename = "year_closed_LLM", deserialize_with = "loose_value")]
    pub year_closed: Option<String>,
    #[serde(rename = "number_of_beds_LLM", deserialize_with = "loose_value")]
    pub bed_count: Option<String>,
    #[serde(rename = "number_of_patients_LLM", deserialize_with = "loose_value")]
    pub patient_count: Option<String>,
    #[serde(rename = "peak_patient_population_LLM", deserialize_with = "loose_value")]
    pub peak_population: Option<String>,
    #[serde(
        rename = "hand_check_flag_LLM",
        serialize_with = "flag_as_int",
        deserialize_with = "int_flag"
    )]
    pub uncertain: bool,
}

impl CandidateExtraction {
    /// Substitute used whenever the completion call fails in any way.
    pub fn fallback() -> Self {
        CandidateExtraction {
            year_opened: None,
            year_closed: None,
            bed_count: None,
            patient_count: None,
            peak_population: None,
            uncertain: true,
        }
    }
}

/// Accepts a number, a string, or null. Blank strings and "null" are absent.
fn loose_value<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    use serde_json::Value;

    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("null") {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
        Some(Value::Number(n)) => Ok(Some(number_text(&n))),
        Some(other) => Err(D::Error::custom(format!(
            "expected number, string or null, got {other}"
        ))),
    }
}

/// Integral floats (`1910.0`) render without the fraction.
fn number_text(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

fn int_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    use serde_json::Value;

    match Value::deserialize(d)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 0.0 => Ok(false),
            Some(f) if f == 1.0 => Ok(true),
            _ => Err(D::Error::custom(format!("flag must be 0 or 1, got {n}"))),
        },
        Value::String(s) => match s.trim() {
            "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(D::Error::custom(format!("flag must be 0 or 1, got {other:?}"))),
        },
        other => Err(D::Error::custom(format!("flag must be 0 or 1, got {other}"))),
    }
}

pub(crate) fn flag_as_int<S: Serializer>(flag: &bool, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u8(u8::from(*flag))
}

// ── Canonical record ──

/// The reconciled output row, in output column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub state: String,
    pub city: Option<String>,
    pub hospital_name: String,
    pub alt_name1: Option<String>,
    pub alt_name2: Option<String>,
    pub alt_name3: Option<String>,
    pub alt_name4: Option<String>,
    pub alt_name5: Option<String>,
    pub hospital_type: Option<String>,
    pub url: String,
    pub current_status: Option<String>,
    pub building_style: Option<String>,
    pub architecture_style: Option<String>,
    pub final_year_opened: Option<i32>,
    pub final_year_closed: Option<i32>,
    pub final_hospital_age: Option<i32>,
    pub final_number_of_beds: Option<u32>,
    pub final_number_of_patients: Option<u32>,
    #[serde(rename = "incomplete_page_flag", serialize_with = "flag_as_int")]
    pub incomplete_page: bool,
    #[serde(rename = "kirkbride_flag", serialize_with = "flag_as_int")]
    pub kirkbride: bool,
    #[serde(rename = "hand_check_flag", serialize_with = "flag_as_int")]
    pub needs_manual_check: bool,
}

impl CanonicalRecord {
    pub const HEADER: [&'static str; 21] = [
        "state",
        "city",
        "hospital_name",
        "alt_name1",
        "alt_name2",
        "alt_name3",
        "alt_name4",
        "alt_name5",
        "hospital_type",
        "url",
        "current_status",
        "building_style",
        "architecture_style",
        "final_year_opened",
        "final_year_closed",
        "final_hospital_age",
        "final_number_of_beds",
        "final_number_of_patients",
        "incomplete_page_flag",
        "kirkbride_flag",
        "hand_check_flag",
    ];
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infobox_labels_round_trip_and_reject_unknown() {
        for key in InfoboxKey::ALL {
            assert_eq!(InfoboxKey::from_label(key.label()), Some(key));
        }
        assert_eq!(
            InfoboxKey::from_label(" peak patient population "),
            Some(InfoboxKey::PeakPopulation)
        );
        assert_eq!(InfoboxKey::from_label("Architect(s)"), None);
    }

    #[test]
    fn candidate_accepts_numbers_strings_and_nulls() {
        let json = r#"{
            "year_opened_LLM": 1910,
            "year_closed_LLM": "1975",
            "number_of_beds_LLM": 1200.0,
            "number_of_patients_LLM": null,
            "peak_patient_population_LLM": "null",
            "hand_check_flag_LLM": 0
        }"#;
        let c: CandidateExtraction = serde_json::from_str(json).unwrap();
        assert_eq!(c.year_opened.as_deref(), Some("1910"));
        assert_eq!(c.year_closed.as_deref(), Some("1975"));
        assert_eq!(c.bed_count.as_deref(), Some("1200"));
        assert_eq!(c.patient_count, None);
        assert_eq!(c.peak_population, None);
        assert!(!c.uncertain);
    }

    #[test]
    fn candidate_requires_every_field() {
        let json = r#"{ "year_opened_LLM": 1910, "hand_check_flag_LLM": 0 }"#;
        assert!(serde_json::from_str::<CandidateExtraction>(json).is_err());
    }

    #[test]
    fn candidate_rejects_extra_fields_and_bad_flags() {
        let extra = r#"{
            "year_opened_LLM": null, "year_closed_LLM": null,
            "number_of_beds_LLM": null, "number_of_patients_LLM": null,
            "peak_patient_population_LLM": null, "hand_check_flag_LLM": 1,
            "notes": "x"
        }"#;
        assert!(serde_json::from_str::<CandidateExtraction>(extra).is_err());

        let bad_flag = r#"{
            "year_opened_LLM": null, "year_closed_LLM": null,
            "number_of_beds_LLM": null, "number_of_patients_LLM": null,
            "peak_patient_population_LLM": null, "hand_check_flag_LLM": 2
        }"#;
        assert!(serde_json::from_str::<CandidateExtraction>(bad_flag).is_err());
    }

    #[test]
    fn fallback_survives_persistence() {
        let line = serde_json::to_string(&CandidateExtraction::fallback()).unwrap();
        assert!(line.contains("\"hand_check_flag_LLM\":1"));
        let back: CandidateExtraction = serde_json::from_str(&line).unwrap();
        assert_eq!(back, CandidateExtraction::fallback());
    }

    #[test]
    fn unavailable_record_is_distinguishable() {
        let link = FacilityLink {
            state: "Ohio".into(),
            facility_type: "State Hospitals".into(),
            name: "Athens".into(),
            url: Some("https://example.org/Athens".into()),
        };
        let r = RawRecord::unavailable(&link, "https://example.org/Athens");
        assert!(r.is_unavailable());
        assert!(r.body.is_empty());
        assert_eq!(r.infobox, InfoboxFields::default());
    }
}
