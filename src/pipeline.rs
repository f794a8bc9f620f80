use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::extract::{extract_candidate, CompletionService};
use crate::fetcher::{fetch_detail_page, fetch_html, PageSource};
use crate::limiter::RateLimiter;
use crate::model::{CanonicalRecord, RawRecord};
use crate::parser::listing::{parse_state_index, parse_state_listing};
use crate::reconcile::reconcile;
use crate::settings::Settings;
use crate::store::{self, ProcessedRecord};

const RAW_FILE: &str = "hospital_details.jsonl";

#[derive(Debug)]
pub struct LinkStats {
    pub states: usize,
    pub facilities: usize,
}

#[derive(Debug)]
pub struct ScrapeStats {
    pub total: usize,
    pub ok: usize,
    pub unavailable: usize,
}

#[derive(Debug)]
pub struct ExtractStats {
    pub files: usize,
    pub records: usize,
    pub fallbacks: usize,
}

#[derive(Debug)]
pub struct ReconcileStats {
    pub records: usize,
    pub needs_manual_check: usize,
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

/// State index, then each state's listing. State links are overwritten,
/// facility links appended.
pub async fn collect_links(
    settings: &Settings,
    source: &impl PageSource,
    pacer: &impl RateLimiter,
) -> Result<LinkStats> {
    let index_url = settings.state_index_url();
    pacer.acquire().await;
    let html = fetch_html(source, &index_url).await;
    let states = parse_state_index(&html, &settings.base_url);
    if states.is_empty() {
        warn!(url = %index_url, "No state links found");
    }
    store::write_state_links(&settings.state_links_path(), &states)?;
    info!(count = states.len(), "State links saved");

    let links_path = settings.facility_links_path();
    let mut facilities = 0usize;
    for state in &states {
        pacer.acquire().await;
        info!(state = %state.name, url = %state.url, "Scraping facility links");
        let html = fetch_html(source, &state.url).await;
        let rows = parse_state_listing(&html, &settings.base_url);
        store::append_facility_links(&links_path, &rows)?;
        info!(state = %state.name, rows = rows.len(), "Facility links saved");
        facilities += rows.len();
    }

    Ok(LinkStats {
        states: states.len(),
        facilities,
    })
}

/// Fetch every linked detail page. Each link yields exactly one record.
pub async fn scrape_details(
    settings: &Settings,
    source: &impl PageSource,
    pacer: &impl RateLimiter,
    limit: Option<usize>,
) -> Result<ScrapeStats> {
    let links_path = settings.facility_links_path();
    let links = store::read_facility_links(&links_path)
        .with_context(|| format!("reading {}", links_path.display()))?;

    let targets: Vec<_> = links
        .iter()
        .filter_map(|l| l.url.as_deref().map(|u| (l, u)))
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    let policy = settings.retry_policy();
    let pb = progress_bar(targets.len())?;
    let mut records: Vec<RawRecord> = Vec::with_capacity(targets.len());
    for (link, url) in targets {
        records.push(fetch_detail_page(source, pacer, policy, link, url).await);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let unavailable = records.iter().filter(|r| r.is_unavailable()).count();
    store::write_jsonl(&settings.raw_dir().join(RAW_FILE), &records)?;
    info!(total = records.len(), unavailable, "Raw records saved");

    Ok(ScrapeStats {
        total: records.len(),
        ok: records.len() - unavailable,
        unavailable,
    })
}

/// Run the extraction adapter over every raw file, one processed file each.
pub async fn extract_candidates(
    settings: &Settings,
    service: &impl CompletionService,
    pacer: &impl RateLimiter,
) -> Result<ExtractStats> {
    let raw_dir = settings.raw_dir();
    let files = store::list_jsonl(&raw_dir, "")
        .with_context(|| format!("listing {}", raw_dir.display()))?;

    let mut stats = ExtractStats {
        files: 0,
        records: 0,
        fallbacks: 0,
    };

    for file in &files {
        let records: Vec<RawRecord> = match store::read_jsonl(file) {
            Ok(records) => records,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Skipping unreadable raw file");
                continue;
            }
        };

        let pb = progress_bar(records.len())?;
        let mut processed = Vec::with_capacity(records.len());
        for (row, record) in records.into_iter().enumerate() {
            info!(file = %file.display(), row = row + 1, name = %record.name, "Extracting");
            let candidate =
                extract_candidate(service, pacer, &record.name, &record.url, &record.body).await;
            if candidate.uncertain {
                stats.fallbacks += 1;
            }
            processed.push(ProcessedRecord { record, candidate });
            pb.inc(1);
        }
        pb.finish_and_clear();

        let out = store::processed_path(&settings.processed_dir(), file);
        store::write_jsonl(&out, &processed)?;
        info!(file = %out.display(), rows = processed.len(), "Processed file saved");
        stats.files += 1;
        stats.records += processed.len();
    }

    Ok(stats)
}

/// Reconcile every processed record into the final table.
pub fn reconcile_all(settings: &Settings) -> Result<ReconcileStats> {
    let processed = store::read_processed_dir(&settings.processed_dir())?;

    let canonical: Vec<CanonicalRecord> = processed
        .iter()
        .map(|p| reconcile(&p.record, &p.candidate))
        .collect();

    let out = settings.final_output_path();
    store::write_final(&out, &canonical)?;
    info!(file = %out.display(), rows = canonical.len(), "Final output saved");

    Ok(ReconcileStats {
        records: canonical.len(),
        needs_manual_check: canonical.iter().filter(|c| c.needs_manual_check).count(),
    })
}

// ── Tests ──
