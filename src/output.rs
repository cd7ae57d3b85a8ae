//! Table inspection for the `view` subcommand.
//!
//! Logs existence, row count and (at debug level) every row of the three
//! pipeline tables.

use anyhow::Result;
use std::fmt::Debug;
use tracing::{debug, info, warn};

use crate::config::TableNames;
use crate::model::{LocationSummary, TrafficReading, WeatherReading};
use crate::store::{Record, Store};

/// What the viewer found for one table. `rows` is `None` if the table does
/// not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    pub table: String,
    pub rows: Option<usize>,
}

/// Logs a row using Rust's debug pretty-print format.
pub fn print_pretty<T: Debug>(row: &T) {
    debug!("{:#?}", row);
}

fn view_table<R: Record + Debug>(store: &Store, table: &str) -> Result<TableView> {
    if !store.exists(table)? {
        warn!(table, "Table does not exist");
        return Ok(TableView {
            table: table.to_string(),
            rows: None,
        });
    }

    let rows: Vec<R> = store.read(table)?;
    info!(table, rows = rows.len(), "Table contents");
    rows.iter().for_each(print_pretty);

    Ok(TableView {
        table: table.to_string(),
        rows: Some(rows.len()),
    })
}

/// Inspects the traffic, weather and summary tables in that order.
///
/// A missing table is reported, not an error.
#[tracing::instrument(skip(store))]
pub fn view_tables(store: &Store, tables: &TableNames) -> Result<Vec<TableView>> {
    Ok(vec![
        view_table::<TrafficReading>(store, &tables.traffic)?,
        view_table::<WeatherReading>(store, &tables.weather)?,
        view_table::<LocationSummary>(store, &tables.summary)?,
    ])
}
