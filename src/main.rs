mod error;
mod extract;
mod fetcher;
mod limiter;
mod logging;
mod model;
mod parser;
mod pipeline;
mod reconcile;
mod settings;
mod store;

use std::time::Instant;

use clap::{Parser, Subcommand};

use extract::CompletionClient;
use fetcher::ProxyFetcher;
use limiter::FixedInterval;
use settings::Settings;

#[derive(Parser)]
#[command(name = "asylum_scraper", about = "Historical asylum records: scrape, extract, reconcile")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect state and facility links from the wiki
    Links,
    /// Fetch and parse every linked facility page
    Scrape {
        /// Max pages to scrape (default: all linked pages)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract numeric fields from page text via the completion service
    Extract,
    /// Merge all sources into the final table
    Reconcile,
    /// links + scrape + extract + reconcile
    Run {
        /// Max pages to scrape
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    logging::init(&settings)?;
    let pacing = settings.pacing();

    let result = match cli.command {
        Commands::Links => run_links(&settings).await,
        Commands::Scrape { limit } => run_scrape(&settings, limit).await,
        Commands::Extract => run_extract(&settings).await,
        Commands::Reconcile => run_reconcile(&settings),
        Commands::Run { limit } => {
            tracing::info!(?pacing, "Starting full pipeline");
            run_links(&settings).await?;
            run_scrape(&settings, limit).await?;
            run_extract(&settings).await?;
            run_reconcile(&settings)
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_links(settings: &Settings) -> anyhow::Result<()> {
    let source = ProxyFetcher::new(settings)?;
    let pacer = FixedInterval::new(settings.pacing().state_page);
    let stats = pipeline::collect_links(settings, &source, &pacer).await?;
    println!(
        "Saved {} state links and {} facility links.",
        stats.states, stats.facilities
    );
    Ok(())
}

async fn run_scrape(settings: &Settings, limit: Option<usize>) -> anyhow::Result<()> {
    let source = ProxyFetcher::new(settings)?;
    let pacer = FixedInterval::new(settings.pacing().detail_page);
    let stats = pipeline::scrape_details(settings, &source, &pacer, limit).await?;
    println!(
        "Scraped {} pages ({} ok, {} unavailable).",
        stats.total, stats.ok, stats.unavailable
    );
    Ok(())
}

async fn run_extract(settings: &Settings) -> anyhow::Result<()> {
    let service = CompletionClient::new(settings)?;
    let pacer = FixedInterval::new(settings.pacing().extraction);
    let stats = pipeline::extract_candidates(settings, &service, &pacer).await?;
    println!(
        "Extracted {} records from {} files ({} flagged uncertain).",
        stats.records, stats.files, stats.fallbacks
    );
    Ok(())
}

fn run_reconcile(settings: &Settings) -> anyhow::Result<()> {
    let stats = pipeline::reconcile_all(settings)?;
    println!(
        "Reconciled {} records ({} need a manual check) into {}.",
        stats.records,
        stats.needs_manual_check,
        settings.final_output_path().display()
    );
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
