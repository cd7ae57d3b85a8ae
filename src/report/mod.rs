//! Renders the summary table as a standalone HTML page.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use plotly::common::{Mode, Title};
use plotly::layout::Axis;
use plotly::{Layout, Plot, Scatter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::model::LocationSummary;
use crate::store::Store;

const TITLE: &str = "Weather and Traffic Data Visualization Over Time";

/// Groups summaries into one time-ordered series per location, dropping
/// rows without an average transit time.
fn series_by_location(summaries: &[LocationSummary]) -> BTreeMap<&str, Vec<(DateTime<Utc>, f64)>> {
    let mut by_location: BTreeMap<&str, Vec<_>> = BTreeMap::new();
    for s in summaries {
        if let Some(minutes) = s.avg_transit_time_minutes {
            by_location
                .entry(s.location_name.as_str())
                .or_default()
                .push((s.transformed_at, minutes));
        }
    }
    for points in by_location.values_mut() {
        points.sort_by_key(|(t, _)| *t);
    }
    by_location
}

/// One line trace per location: transformation time against average
/// transit time.
pub fn build_plot(summaries: &[LocationSummary]) -> Plot {
    let mut plot = Plot::new();

    for (location, points) in series_by_location(summaries) {
        let (x, y): (Vec<String>, Vec<f64>) = points
            .into_iter()
            .map(|(t, minutes)| (t.format("%Y-%m-%d %H:%M:%S%.3f").to_string(), minutes))
            .unzip();
        let trace = Scatter::new(x, y).name(location).mode(Mode::LinesMarkers);
        plot.add_trace(trace);
    }

    plot.set_layout(
        Layout::new()
            .title(Title::with_text(TITLE))
            .x_axis(Axis::new().title(Title::with_text("Transformation time (UTC)")))
            .y_axis(Axis::new().title(Title::with_text("Average transit time (minutes)"))),
    );
    plot
}

/// Builds the complete HTML document with plotly.js inlined, so the file
/// opens without network access.
pub fn render_html(summaries: &[LocationSummary]) -> String {
    // With the `plotly_embed_js` feature, `Plot::new()` already uses local
    // (inlined) copies of plotly.js.
    let plot = build_plot(summaries);
    plot.to_html()
}

/// Reads `table` and writes the chart to `output`.
///
/// Returns `Ok(None)` without writing anything if the table is empty.
///
/// # Errors
///
/// Fails if the table does not exist or the file cannot be written.
#[tracing::instrument(skip(store))]
pub fn run_report(store: &Store, table: &str, output: &Path) -> Result<Option<PathBuf>> {
    let summaries: Vec<LocationSummary> = store
        .read(table)
        .with_context(|| format!("failed to read summary table '{table}'"))?;

    if summaries.is_empty() {
        info!(table, "Summary table is empty, nothing to visualize");
        return Ok(None);
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    std::fs::write(output, render_html(&summaries))
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!(path = %output.display(), rows = summaries.len(), "Report written");
    Ok(Some(output.to_path_buf()))
}
