//! Spatial and temporal matching of traffic rows against weather rows.
//!
//! All lookups take weather rows already sorted by capture time (stable on
//! stored order), which is what makes "first match wins" deterministic.

use chrono::{DateTime, Utc};

use crate::model::WeatherReading;

/// Splits a `"lat,lon"` point on its first comma.
pub fn parse_point(point: &str) -> Option<(f64, f64)> {
    let (lat, lon) = point.split_once(',')?;
    let lat = lat.trim().parse::<f64>().ok()?;
    let lon = lon.trim().parse::<f64>().ok()?;
    Some((lat, lon))
}

/// Name of the earliest-captured weather row at exactly these coordinates.
pub fn resolve_location<'a>(
    lat: f64,
    lon: f64,
    weather_by_time: &[&'a WeatherReading],
) -> Option<&'a str> {
    weather_by_time
        .iter()
        .copied()
        .filter(|w| w.latitude == lat && w.longitude == lon)
        .find_map(|w| w.location_name.as_deref())
}

/// Weather row for `location_name` captured closest to `at`.
///
/// Ties go to the earlier capture, since `min_by_key` keeps the first of
/// equal elements.
pub fn nearest_weather<'a>(
    location_name: &str,
    at: DateTime<Utc>,
    weather_by_time: &[&'a WeatherReading],
) -> Option<&'a WeatherReading> {
    let at_micros = at.timestamp_micros();
    weather_by_time
        .iter()
        .copied()
        .filter(|w| w.location_name.as_deref() == Some(location_name))
        .min_by_key(|w| w.captured_at.timestamp_micros().abs_diff(at_micros))
}
