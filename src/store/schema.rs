//! Fixed table schemas for every row type the pipeline persists.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::{Type, Value};

use crate::model::{LocationSummary, TrafficReading, WeatherReading};

/// A column in a table schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
}

const fn col(name: &'static str, sql_type: &'static str) -> Column {
    Column { name, sql_type }
}

/// A row type with an explicit, fixed table layout.
///
/// `to_values` and `from_row` must follow the order of `COLUMNS`.
pub trait Record: Sized {
    const COLUMNS: &'static [Column];

    fn to_values(&self) -> Vec<Value>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn text(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

fn real(value: Option<f64>) -> Value {
    match value {
        Some(v) => Value::Real(v),
        None => Value::Null,
    }
}

impl Record for TrafficReading {
    const COLUMNS: &'static [Column] = &[
        col("frc", "TEXT"),
        col("current_speed", "REAL"),
        col("free_flow_speed", "REAL"),
        col("current_travel_time", "REAL"),
        col("free_flow_travel_time", "REAL"),
        col("confidence", "REAL"),
        col("road_closure", "INTEGER NOT NULL"),
        col("point", "TEXT NOT NULL"),
        col("extraction_timestamp", "TEXT NOT NULL"),
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            text(&self.road_class),
            real(self.current_speed),
            real(self.free_flow_speed),
            real(self.current_travel_time_seconds),
            real(self.free_flow_travel_time_seconds),
            real(self.confidence),
            Value::Integer(i64::from(self.road_closed)),
            Value::Text(self.point.clone()),
            Value::Text(format_timestamp(&self.captured_at)),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            road_class: row.get(0)?,
            current_speed: row.get(1)?,
            free_flow_speed: row.get(2)?,
            current_travel_time_seconds: row.get(3)?,
            free_flow_travel_time_seconds: row.get(4)?,
            confidence: row.get(5)?,
            road_closed: row.get(6)?,
            point: row.get(7)?,
            captured_at: timestamp_at(row, 8)?,
        })
    }
}

impl Record for WeatherReading {
    const COLUMNS: &'static [Column] = &[
        col("latitude", "REAL NOT NULL"),
        col("longitude", "REAL NOT NULL"),
        col("fetch_timestamp_utc", "TEXT NOT NULL"),
        col("location_name", "TEXT"),
        col("temperature_celsius", "REAL"),
        col("weather_description", "TEXT"),
        col("weather_icon", "TEXT"),
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Real(self.latitude),
            Value::Real(self.longitude),
            Value::Text(format_timestamp(&self.captured_at)),
            text(&self.location_name),
            real(self.temperature_celsius),
            text(&self.description),
            text(&self.icon),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            latitude: row.get(0)?,
            longitude: row.get(1)?,
            captured_at: timestamp_at(row, 2)?,
            location_name: row.get(3)?,
            temperature_celsius: row.get(4)?,
            description: row.get(5)?,
            icon: row.get(6)?,
        })
    }
}

impl Record for LocationSummary {
    const COLUMNS: &'static [Column] = &[
        col("location_name", "TEXT NOT NULL"),
        col("avg_transit_time_minutes", "REAL"),
        col("avg_confidence_level", "REAL"),
        col("weather_description", "TEXT"),
        col("temperature_celsius", "REAL"),
        col("representative_traffic_timestamp", "TEXT NOT NULL"),
        col("transformation_timestamp", "TEXT NOT NULL"),
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.location_name.clone()),
            real(self.avg_transit_time_minutes),
            real(self.avg_confidence),
            text(&self.weather_description),
            real(self.temperature_celsius),
            Value::Text(format_timestamp(&self.representative_traffic_timestamp)),
            Value::Text(format_timestamp(&self.transformed_at)),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            location_name: row.get(0)?,
            avg_transit_time_minutes: row.get(1)?,
            avg_confidence: row.get(2)?,
            weather_description: row.get(3)?,
            temperature_celsius: row.get(4)?,
            representative_traffic_timestamp: timestamp_at(row, 5)?,
            transformed_at: timestamp_at(row, 6)?,
        })
    }
}
