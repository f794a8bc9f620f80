//! Field reconciliation: one raw record plus its candidate extraction in,
//! one canonical record out. Pure and stateless.
//!
//! Precedence (first valid value wins):
//!
//! | field | sources |
//! |---|---|
//! | year opened | infobox Opened, candidate, infobox Established, infobox Construction Began |
//! | year closed | infobox Closed, candidate |
//! | beds | candidate |
//! | patients | candidate patients, candidate peak population, infobox Peak Patient Population |

pub mod normalize;

use crate::model::{CandidateExtraction, CanonicalRecord, RawRecord};
use normalize::{
    city_of, is_broken_link, mentions_kirkbride, normalize_count, normalize_type, normalize_year,
    split_alt_names,
};

pub fn reconcile(raw: &RawRecord, candidate: &CandidateExtraction) -> CanonicalRecord {
    let info = &raw.infobox;

    let year_opened = first_year(&[
        info.opened.as_deref(),
        candidate.year_opened.as_deref(),
        info.established.as_deref(),
        info.construction_began.as_deref(),
    ]);
    let year_closed = first_year(&[info.closed.as_deref(), candidate.year_closed.as_deref()]);
    let beds = first_count(&[candidate.bed_count.as_deref()]);
    let patients = first_count(&[
        candidate.patient_count.as_deref(),
        candidate.peak_population.as_deref(),
        info.peak_population.as_deref(),
    ]);

    let age = match (year_opened, year_closed) {
        (Some(opened), Some(closed)) => Some(closed - opened),
        _ => None,
    };

    let kirkbride = mentions_kirkbride(&[
        info.building_style.as_deref().unwrap_or(""),
        info.architecture_style.as_deref().unwrap_or(""),
        raw.body.as_str(),
    ]);

    let [alt_name1, alt_name2, alt_name3, alt_name4, alt_name5] =
        split_alt_names(info.alternate_names.as_deref());

    CanonicalRecord {
        state: raw.state.clone(),
        city: city_of(info.location.as_deref()),
        hospital_name: raw.name.clone(),
        alt_name1,
        alt_name2,
        alt_name3,
        alt_name4,
        alt_name5,
        hospital_type: raw.facility_type.as_deref().and_then(normalize_type),
        url: raw.url.clone(),
        current_status: info.current_status.clone(),
        building_style: info.building_style.clone(),
        architecture_style: info.architecture_style.clone(),
        final_year_opened: year_opened,
        final_year_closed: year_closed,
        final_hospital_age: age,
        final_number_of_beds: beds,
        final_number_of_patients: patients,
        incomplete_page: is_broken_link(&raw.url),
        kirkbride,
        needs_manual_check: needs_manual_check(year_opened, year_closed, beds, patients),
    }
}

fn first_year(sources: &[Option<&str>]) -> Option<i32> {
    sources.iter().flatten().find_map(|v| normalize_year(v))
}

fn first_count(sources: &[Option<&str>]) -> Option<u32> {
    sources.iter().flatten().find_map(|v| normalize_count(v))
}

/// True only when every key date and count is unrecoverable.
pub fn needs_manual_check(
    year_opened: Option<i32>,
    year_closed: Option<i32>,
    beds: Option<u32>,
    patients: Option<u32>,
) -> bool {
    year_opened.is_none() && year_closed.is_none() && beds.is_none() && patients.is_none()
}

// ── Tests ──
