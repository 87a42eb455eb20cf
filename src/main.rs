// Visa Bulletin CLI - sync, refresh, export, status

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use visa_bulletin::config::Settings;
use visa_bulletin::logging::init_logging;
use visa_bulletin::{
    BulletinFetcher, BulletinParser, ExportEngine, FetchOutcome, ScrapeController, Store,
    SyncReport, YearMonth,
};

/// Visa Bulletin normalization pipeline
#[derive(Parser, Debug)]
#[command(name = "visa-bulletin")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "visa-bulletin.toml", env = "VISA_BULLETIN_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, parse and store every bulletin in a month range
    Sync {
        /// First month (YYYY-MM)
        #[arg(long, default_value = "2006-01")]
        start: YearMonth,

        /// Last month (YYYY-MM), defaults to next month
        #[arg(long)]
        end: Option<YearMonth>,

        /// Re-scrape months that are already stored
        #[arg(long)]
        force: bool,
    },

    /// Store the newest bulletins linked from the bulletin index page
    Refresh {
        #[arg(long, default_value_t = 3)]
        limit: usize,
    },

    /// Write the frontend export
    Export {
        /// JSON output (defaults to [export] json_path)
        #[arg(long)]
        json: Option<PathBuf>,

        /// CSV output (defaults to [export] csv_path)
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Show what the store holds
    Status,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;
    init_logging(&settings.logging)?;

    match cli.command {
        Commands::Sync { start, end, force } => {
            let end = end.unwrap_or_else(next_month);
            let report = run_sync(&settings, |controller| controller.sync(start, end, force))?;
            Ok(finish(&report))
        }
        Commands::Refresh { limit } => {
            let fetcher = build_fetcher(&settings)?;
            let index = match fetcher.fetch_index().context("Failed to fetch bulletin index")? {
                FetchOutcome::Html(html) => html,
                FetchOutcome::NotPublished => bail!("Bulletin index page not available"),
            };
            let report = run_sync(&settings, |controller| controller.refresh_latest(&index, limit))?;
            Ok(finish(&report))
        }
        Commands::Export { json, csv } => {
            run_export(&settings, json, csv)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            run_status(&settings)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Month after the current one: bulletins are published ahead
fn next_month() -> YearMonth {
    let today = Utc::now().date_naive();
    YearMonth::from_date(today.with_day(1).unwrap_or(today)).next()
}

fn build_fetcher(settings: &Settings) -> Result<Box<dyn BulletinFetcher>> {
    #[cfg(feature = "http")]
    {
        let http = visa_bulletin::HttpFetcher::new(
            &settings.fetch.base_url,
            settings.fetch.timeout(),
            &settings.fetch.user_agent,
        )?;
        match &settings.fetch.cache_dir {
            Some(dir) => Ok(Box::new(visa_bulletin::CachingFetcher::new(http, dir.clone()))),
            None => Ok(Box::new(http)),
        }
    }

    #[cfg(not(feature = "http"))]
    {
        match &settings.fetch.cache_dir {
            Some(dir) => Ok(Box::new(visa_bulletin::CacheFetcher::new(dir.clone()))),
            None => bail!("Built without the \"http\" feature: set [fetch] cache_dir"),
        }
    }
}

fn run_sync<F>(settings: &Settings, run: F) -> Result<SyncReport>
where
    F: FnOnce(&mut ScrapeController<'_>) -> visa_bulletin::BulletinResult<SyncReport>,
{
    let vocabulary = Arc::new(settings.vocabulary()?);
    let parser = BulletinParser::new(vocabulary);
    let fetcher = build_fetcher(settings)?;
    let mut store = Store::open(&settings.store.path)
        .with_context(|| format!("Failed to open store {}", settings.store.path.display()))?;

    let mut controller = ScrapeController::new(&mut store, fetcher.as_ref(), &parser);
    let report = run(&mut controller)?;
    Ok(report)
}

fn finish(report: &SyncReport) -> ExitCode {
    for result in &report.results {
        println!("{}  {}", result.period, result.outcome.label());
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());

    if report.has_failures() {
        println!("\n❌ Failed months:");
        for failure in report.failures() {
            println!("  - {}: {:?}", failure.period, failure.outcome);
        }
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_export(settings: &Settings, json: Option<PathBuf>, csv: Option<PathBuf>) -> Result<()> {
    let store = Store::open(&settings.store.path)
        .with_context(|| format!("Failed to open store {}", settings.store.path.display()))?;

    let document = ExportEngine::new(&store).export()?;
    if document.months.is_empty() {
        bail!("No bulletins stored. Run `visa-bulletin sync` first.");
    }

    let json_path = json.unwrap_or_else(|| settings.export.json_path.clone());
    document.write_json(&json_path)?;
    println!("✓ Exported {} months to {}", document.months.len(), json_path.display());

    if let Some(csv_path) = csv.or_else(|| settings.export.csv_path.clone()) {
        document.write_csv(&csv_path)?;
        println!("✓ Wrote CSV history to {}", csv_path.display());
    }

    Ok(())
}

fn run_status(settings: &Settings) -> Result<()> {
    let store = Store::open(&settings.store.path)
        .with_context(|| format!("Failed to open store {}", settings.store.path.display()))?;

    let months = store.months()?;
    println!("🗄️  {}", settings.store.path.display());
    println!("Bulletins: {}", months.len());
    println!("Records:   {}", store.record_count()?);

    match (months.first(), months.last()) {
        (Some(first), Some(last)) => println!("Range:     {} → {}", first.period, last.period),
        _ => println!("Range:     (empty)"),
    }

    for summary in months.iter().rev().take(6) {
        println!(
            "  {}  {:<8}  {:>4} records  {}",
            summary.period,
            summary.layout.code(),
            summary.record_count,
            &summary.content_hash[..12.min(summary.content_hash.len())]
        );
    }

    Ok(())
}
