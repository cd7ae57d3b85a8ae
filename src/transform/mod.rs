//! Join-aggregate transform.
//!
//! Reads the traffic and weather tables, matches each traffic reading to the
//! nearest-in-time weather reading for its location, aggregates one summary
//! row per location and appends the batch to the summary table.

pub mod aggregate;
pub mod matching;
pub mod utility;

pub use aggregate::summarize;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::TableNames;
use crate::model::{LocationSummary, TrafficReading, WeatherReading};
use crate::store::Store;

/// Result of a transform run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// Summaries were appended; `rows` may be zero if nothing matched.
    Completed { rows: usize },
    /// A source table was missing or empty, so nothing was written.
    Skipped { reason: String },
}

fn source_problem(store: &Store, table: &str) -> Result<Option<String>> {
    if !store.exists(table)? {
        return Ok(Some(format!("table '{table}' is missing")));
    }
    if store.count(table)? == 0 {
        return Ok(Some(format!("table '{table}' is empty")));
    }
    Ok(None)
}

/// Runs the transform against `store`, stamping every summary with
/// `transformed_at`.
///
/// # Errors
///
/// Store failures (including a summary table with the wrong columns) are
/// returned as-is; nothing is retried.
#[tracing::instrument(skip(store))]
pub fn run_transform(
    store: &mut Store,
    tables: &TableNames,
    transformed_at: DateTime<Utc>,
) -> Result<TransformOutcome> {
    let mut problems = Vec::new();
    for table in [&tables.traffic, &tables.weather] {
        if let Some(problem) = source_problem(store, table)? {
            problems.push(problem);
        }
    }
    if !problems.is_empty() {
        let reason = problems.join("; ");
        warn!(%reason, "Skipping transform");
        return Ok(TransformOutcome::Skipped { reason });
    }

    let traffic: Vec<TrafficReading> = store
        .read(&tables.traffic)
        .with_context(|| format!("failed to read traffic table '{}'", tables.traffic))?;
    let weather: Vec<WeatherReading> = store
        .read(&tables.weather)
        .with_context(|| format!("failed to read weather table '{}'", tables.weather))?;

    let summaries = summarize(&traffic, &weather, transformed_at);

    store
        .ensure_table::<LocationSummary>(&tables.summary)
        .with_context(|| format!("failed to prepare summary table '{}'", tables.summary))?;
    let rows = store
        .append(&tables.summary, &summaries)
        .with_context(|| format!("failed to insert into '{}'", tables.summary))?;

    info!(
        traffic_rows = traffic.len(),
        weather_rows = weather.len(),
        summaries = rows,
        total = store.count(&tables.summary)?,
        "Transform complete"
    );
    Ok(TransformOutcome::Completed { rows })
}
