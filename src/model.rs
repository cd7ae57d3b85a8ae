//! Row types flowing through the pipeline.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One traffic flow sample for a monitored point.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficReading {
    /// Functional road class (`frc`), e.g. `FRC0`.
    pub road_class: Option<String>,
    pub current_speed: Option<f64>,
    pub free_flow_speed: Option<f64>,
    pub current_travel_time_seconds: Option<f64>,
    pub free_flow_travel_time_seconds: Option<f64>,
    pub confidence: Option<f64>,
    pub road_closed: bool,
    /// `"lat,lon"` identifier of the monitored point.
    pub point: String,
    pub captured_at: DateTime<Utc>,
}

/// Current weather conditions captured for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: Option<String>,
    pub temperature_celsius: Option<f64>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Traffic for one location joined with its nearest weather reading,
/// aggregated over a single transform run.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSummary {
    pub location_name: String,
    pub avg_transit_time_minutes: Option<f64>,
    pub avg_confidence: Option<f64>,
    pub weather_description: Option<String>,
    pub temperature_celsius: Option<f64>,
    pub representative_traffic_timestamp: DateTime<Utc>,
    pub transformed_at: DateTime<Utc>,
}

/// A weather monitoring location as supplied by configuration.
///
/// Coordinates are optional at the type level so that a half-written entry
/// can be reported as a configuration error instead of a parse failure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Location {
    #[serde(rename = "lat")]
    pub latitude: Option<f64>,
    #[serde(rename = "lon")]
    pub longitude: Option<f64>,
    pub name: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, name: &str) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            name: Some(name.to_string()),
        }
    }

    /// Returns `(latitude, longitude)`, failing if either is missing.
    pub fn coordinates(&self) -> anyhow::Result<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Ok((lat, lon)),
            _ => Err(anyhow::anyhow!(
                "invalid location {:?}: both 'lat' and 'lon' are required",
                self
            )),
        }
    }

    /// Name used in log output; falls back to the coordinates.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!(
                "lat{}_lon{}",
                fmt_opt(self.latitude),
                fmt_opt(self.longitude)
            ),
        }
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "None".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_coordinates_missing() {
        let loc = Location {
            latitude: Some(1.0),
            longitude: None,
            name: None,
        };
        assert!(loc.coordinates().is_err());
    }

    #[test]
    fn test_location_display_name_fallback() {
        let loc = Location {
            latitude: Some(10.5),
            longitude: Some(20.25),
            name: None,
        };
        assert_eq!(loc.display_name(), "lat10.5_lon20.25");
        assert_eq!(Location::new(1.0, 2.0, "X").display_name(), "X");
    }

    #[test]
    fn test_location_deserializes_short_keys() {
        let loc: Location =
            serde_json::from_str(r#"{"lat": 51.5074, "lon": -0.1278, "name": "London"}"#).unwrap();
        assert_eq!(loc, Location::new(51.5074, -0.1278, "London"));
    }
}
