//! End-to-end run: extract both sources, transform, then report.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::extract::{extract_traffic, extract_weather};
use crate::fetch::HttpClient;
use crate::report::run_report;
use crate::store::Store;
use crate::transform::{TransformOutcome, run_transform};

/// How a single stage ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StageStatus {
    Completed { rows: usize },
    Skipped(String),
    Failed(String),
}

impl StageStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageStatus::Failed(_))
    }

    fn from_error(stage: &str, e: anyhow::Error) -> Self {
        let message = format!("{e:#}");
        error!(stage, error = %message, "Stage failed");
        StageStatus::Failed(message)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Completed { rows } => write!(f, "completed ({rows} rows)"),
            StageStatus::Skipped(reason) => write!(f, "skipped: {reason}"),
            StageStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub traffic: StageStatus,
    pub weather: StageStatus,
    pub transform: StageStatus,
    pub report: StageStatus,
    /// Path of the written report, if one was produced.
    pub report_path: Option<PathBuf>,
}

impl PipelineSummary {
    /// True when no stage failed. Skipped stages do not count as failures.
    pub fn succeeded(&self) -> bool {
        ![&self.traffic, &self.weather, &self.transform, &self.report]
            .iter()
            .any(|s| s.is_failed())
    }

    /// Emits one log line per stage plus the overall result.
    pub fn log(&self) {
        let duration = self.finished_at - self.started_at;
        info!(stage = "traffic", status = %self.traffic);
        info!(stage = "weather", status = %self.weather);
        info!(stage = "transform", status = %self.transform);
        info!(stage = "report", status = %self.report);
        if self.succeeded() {
            info!(
                started_at = %self.started_at.to_rfc3339(),
                duration_ms = duration.num_milliseconds(),
                "Pipeline finished"
            );
        } else {
            error!(
                started_at = %self.started_at.to_rfc3339(),
                duration_ms = duration.num_milliseconds(),
                "Pipeline finished with failed stages"
            );
        }
    }
}

/// Extracts every configured traffic point and appends the readings.
///
/// Returns the number of rows written.
pub async fn load_traffic<C: HttpClient>(
    client: &C,
    config: &Config,
    store: &mut Store,
) -> Result<usize> {
    let readings = extract_traffic(client, config, &config.traffic_points).await;
    let rows = store
        .append(&config.tables.traffic, &readings)
        .with_context(|| format!("failed to load into '{}'", config.tables.traffic))?;
    Ok(rows)
}

/// Extracts every configured weather location and appends the readings.
///
/// Returns the number of rows written.
pub async fn load_weather<C: HttpClient>(
    client: &C,
    config: &Config,
    store: &mut Store,
) -> Result<usize> {
    let readings = extract_weather(client, config, &config.weather_locations).await?;
    let rows = store
        .append(&config.tables.weather, &readings)
        .with_context(|| format!("failed to load into '{}'", config.tables.weather))?;
    Ok(rows)
}

fn load_status(stage: &str, result: Result<usize>) -> StageStatus {
    match result {
        Ok(0) => {
            warn!(stage, "No rows extracted");
            StageStatus::Skipped("no rows extracted".to_string())
        }
        Ok(rows) => StageStatus::Completed { rows },
        Err(e) => StageStatus::from_error(stage, e),
    }
}

/// The transform only runs if at least one extraction stage loaded rows.
fn extracted_anything(traffic: &StageStatus, weather: &StageStatus) -> bool {
    [traffic, weather]
        .iter()
        .any(|s| matches!(s, StageStatus::Completed { .. }))
}

/// Runs all four stages in order against `store`.
///
/// The two extraction stages are independent of each other. The transform
/// runs if either of them loaded rows, and then does its own source-table
/// checks; the report only runs if the transform completed.
/// `transformed_at` stamps the summary rows.
///
/// # Errors
///
/// Only a missing API key is returned as an error, before any I/O. Stage
/// failures are recorded in the returned [`PipelineSummary`].
#[tracing::instrument(skip_all)]
pub async fn run_pipeline<T: HttpClient, W: HttpClient>(
    config: &Config,
    store: &mut Store,
    traffic_client: &T,
    weather_client: &W,
    transformed_at: DateTime<Utc>,
) -> Result<PipelineSummary> {
    config.traffic_api_key()?;
    config.weather_api_key()?;

    let started_at = Utc::now();
    info!(database = %config.database_path.display(), "Pipeline started");

    info!("Running traffic extraction");
    let traffic = load_status("traffic", load_traffic(traffic_client, config, store).await);

    info!("Running weather extraction");
    let weather = load_status("weather", load_weather(weather_client, config, store).await);

    let transform = if extracted_anything(&traffic, &weather) {
        info!("Running transform");
        match run_transform(store, &config.tables, transformed_at) {
            Ok(TransformOutcome::Completed { rows }) => StageStatus::Completed { rows },
            Ok(TransformOutcome::Skipped { reason }) => StageStatus::Skipped(reason),
            Err(e) => StageStatus::from_error("transform", e),
        }
    } else {
        warn!("Skipping transform, neither extraction loaded any rows");
        StageStatus::Skipped("no rows extracted this run".to_string())
    };

    let mut report_path = None;
    let report = match transform {
        StageStatus::Completed { .. } => {
            info!("Running report");
            match run_report(store, &config.tables.summary, &config.report_output) {
                Ok(Some(path)) => {
                    report_path = Some(path);
                    StageStatus::Completed {
                        rows: store.count(&config.tables.summary).unwrap_or_default(),
                    }
                }
                Ok(None) => StageStatus::Skipped("summary table is empty".to_string()),
                Err(e) => StageStatus::from_error("report", e),
            }
        }
        _ => {
            warn!("Skipping report, transform did not complete");
            StageStatus::Skipped("transform did not complete".to_string())
        }
    };

    Ok(PipelineSummary {
        started_at,
        finished_at: Utc::now(),
        traffic,
        weather,
        transform,
        report,
        report_path,
    })
}
