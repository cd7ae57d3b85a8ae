//! CLI entry point for the traffic and weather ETL.
//!
//! Provides subcommands for each pipeline stage, the full run, and a table
//! viewer for inspecting the database.

use anyhow::{Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use traffic_weather_etl::{
    config::Config,
    fetch::{BasicClient, auth::UrlParam},
    output::view_tables,
    pipeline::{load_traffic, load_weather, run_pipeline},
    report::run_report,
    store::Store,
    transform::{TransformOutcome, run_transform},
};

/// Query parameter both APIs read the key from.
const API_KEY_PARAM: &str = "key";

#[derive(Parser)]
#[command(name = "traffic_weather_etl")]
#[command(about = "Collects traffic and weather data and charts them together", long_about = None)]
struct Cli {
    /// SQLite database file (overrides DATABASE_PATH)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run extraction, transform and report in one go
    Run,
    /// Fetch traffic flow for every configured point and store it
    ExtractTraffic,
    /// Fetch current weather for every configured location and store it
    ExtractWeather,
    /// Join traffic with weather and append per-location summaries
    Transform,
    /// Render the summary table as an HTML chart
    Report {
        /// HTML file to write (overrides REPORT_OUTPUT_FILE)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show existence, row count and rows of each table
    View,
}

fn authed_client(config: &Config, key: &str) -> Result<UrlParam<BasicClient>> {
    Ok(UrlParam::new(
        BasicClient::with_timeout(config.api_timeout)?,
        API_KEY_PARAM,
        key,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/traffic_weather_etl.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("traffic_weather_etl.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    match cli.command {
        Commands::Run => {
            let traffic_client = authed_client(&config, config.traffic_api_key()?)?;
            let weather_client = authed_client(&config, config.weather_api_key()?)?;
            let mut store = Store::open(&config.database_path)?;

            let summary = run_pipeline(
                &config,
                &mut store,
                &traffic_client,
                &weather_client,
                Utc::now(),
            )
            .await?;
            summary.log();

            if let Some(path) = &summary.report_path {
                info!(path = %path.display(), "Open the report in a browser");
            }
            if !summary.succeeded() {
                bail!("one or more pipeline stages failed");
            }
        }
        Commands::ExtractTraffic => {
            let client = authed_client(&config, config.traffic_api_key()?)?;
            let mut store = Store::open(&config.database_path)?;

            let rows = load_traffic(&client, &config, &mut store).await?;
            if rows == 0 {
                warn!("No traffic readings were extracted");
            }
            info!(
                rows,
                total = store.count(&config.tables.traffic).unwrap_or_default(),
                "Traffic ETL finished"
            );
        }
        Commands::ExtractWeather => {
            let client = authed_client(&config, config.weather_api_key()?)?;
            let mut store = Store::open(&config.database_path)?;

            let rows = load_weather(&client, &config, &mut store).await?;
            if rows == 0 {
                warn!("No weather readings were extracted");
            }
            info!(
                rows,
                total = store.count(&config.tables.weather).unwrap_or_default(),
                "Weather ETL finished"
            );
        }
        Commands::Transform => {
            let mut store = Store::open(&config.database_path)?;

            match run_transform(&mut store, &config.tables, Utc::now())? {
                TransformOutcome::Completed { rows } => info!(rows, "Transform finished"),
                TransformOutcome::Skipped { reason } => warn!(%reason, "Transform skipped"),
            }
        }
        Commands::Report { output } => {
            let output = output.unwrap_or_else(|| config.report_output.clone());
            let store = Store::open(&config.database_path)?;

            match run_report(&store, &config.tables.summary, &output) {
                Ok(Some(path)) => info!(path = %path.display(), "Report ready"),
                Ok(None) => warn!("Nothing to report"),
                Err(e) => {
                    error!(error = %format!("{e:#}"), "Report failed");
                    return Err(e);
                }
            }
        }
        Commands::View => {
            let store = Store::open(&config.database_path)?;

            for view in view_tables(&store, &config.tables)? {
                match view.rows {
                    Some(rows) => info!(table = %view.table, rows, "Table"),
                    None => info!(table = %view.table, "Table missing"),
                }
            }
        }
    }

    Ok(())
}
