use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use rss_migrate::config::Config;
use rss_migrate::migrate::{MigrationOptions, Migrator, QueryTemplates, RunReport};
use rss_migrate::preflight;

const RULE: &str =
    "--------------------------------------------------------------------------------";

#[derive(Parser, Debug)]
#[command(
    name = "rss-migrate",
    version,
    about = "Migrate QuiteRSS feeds, categories and articles into an RSS Guard database"
)]
struct Args {
    /// QuiteRSS database to read (opened read-only)
    source: PathBuf,

    /// RSS Guard database to write into
    destination: PathBuf,

    /// TOML file with batch sizes, session tuning and template overrides
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Create the RSS Guard tables first if they are missing
    #[arg(long)]
    init_schema: bool,

    /// Source id of the placeholder root category
    #[arg(long, value_name = "ID", conflicts_with = "no_root_sentinel")]
    root_sentinel_id: Option<i64>,

    /// Keep every recorded parent as is
    #[arg(long)]
    no_root_sentinel: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("ERROR: Migration failed");
            eprintln!("Reason: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    preflight::check_paths(&args.source, &args.destination)?;

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(id) = args.root_sentinel_id {
        config.root_sentinel_id = id;
        config.remap_root_sentinel = true;
    }
    if args.no_root_sentinel {
        config.remap_root_sentinel = false;
    }

    let templates = QueryTemplates::load(config.templates_dir.as_deref())
        .context("Failed to load statement templates")?;
    let migrator = Migrator::new(
        MigrationOptions::from_config(&config, args.init_schema),
        templates,
    );

    tracing::info!(
        source = %args.source.display(),
        destination = %args.destination.display(),
        root_sentinel = ?config.root_sentinel(),
        "Starting migration"
    );

    let report = migrator
        .run(&args.source, &args.destination, &config.tuning)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("{RULE}");
    for line in report.lines() {
        println!("{line}");
    }
    println!("{RULE}");
}
