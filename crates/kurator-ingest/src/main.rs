//! Kurator Ingest - extraction job runner

use anyhow::{Context, Result};
use clap::Parser;
use kurator_common::logging::{init_logging, LogConfig, LogLevel};
use kurator_db::{Connector, Dataset, DbSettings, TableLoader};
use kurator_ingest::{appstore, gomus, gtrends};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "kurator-ingest")]
#[command(author, version, about = "Kurator extraction job runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Fetch App Store reviews into a CSV extract
    Appstore {
        /// App id to fetch reviews for
        #[arg(long)]
        app_id: String,

        /// Two-letter storefront country code
        #[arg(long, default_value = "de")]
        country: String,

        /// Output CSV file
        #[arg(short, long, default_value = "./extracts/appstore_reviews.csv")]
        output: PathBuf,
    },

    /// Fetch a booking report export into a CSV extract
    Gomus {
        /// Base URL of the booking system instance
        #[arg(long)]
        base_url: String,

        /// Report name, e.g. "bookings"
        #[arg(long, default_value = "bookings")]
        report: String,

        /// Output CSV file
        #[arg(short, long, default_value = "./extracts/gomus_bookings.csv")]
        output: PathBuf,
    },

    /// Convert a trends topics mapping into a CSV extract
    Gtrends {
        /// Topics JSON file (topic id -> display name)
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV file
        #[arg(short, long, default_value = "./extracts/gtrends_topics.csv")]
        output: PathBuf,
    },

    /// Load a CSV extract into the warehouse
    Load {
        /// Which source's destination to load into
        #[arg(long, value_enum)]
        source: SourceKind,

        /// Extract file to load
        input: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum SourceKind {
    Appstore,
    Gomus,
    Gtrends,
}

impl SourceKind {
    fn dataset(&self) -> Box<dyn Dataset> {
        match self {
            SourceKind::Appstore => Box::new(appstore::AppstoreReviews),
            SourceKind::Gomus => Box::new(gomus::GomusBookings),
            SourceKind::Gtrends => Box::new(gtrends::GtrendsTopics),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env().unwrap_or_default();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config)?;

    match cli.command {
        Command::Appstore {
            app_id,
            country,
            output,
        } => {
            info!("Fetching App Store reviews");
            appstore::ingest(&app_id, &country, &output).await?;
        },
        Command::Gomus {
            base_url,
            report,
            output,
        } => {
            info!("Fetching booking report export");
            gomus::ingest(&base_url, &report, &output).await?;
        },
        Command::Gtrends { input, output } => {
            info!("Converting trends topics");
            gtrends::ingest(&input, &output)?;
        },
        Command::Load { source, input } => {
            // Connection settings are read exactly once, here, and injected.
            let settings = DbSettings::from_env();
            let connector = Connector::new(&settings);

            let dataset = source.dataset();
            tracing::debug!(
                table = dataset.table_name(),
                declared = ?dataset.columns(),
                "declared layout; the live catalog wins at load time"
            );
            let loader = TableLoader::for_dataset(&connector, dataset.as_ref())?;
            let file = std::fs::File::open(&input)
                .with_context(|| format!("could not open {}", input.display()))?;

            let report = loader.load(file).await?;
            info!(table = %report.table, rows = report.rows, "extract loaded");
        },
    }

    info!("Done");
    Ok(())
}
