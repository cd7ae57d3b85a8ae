use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use std::collections::HashMap;
use tracing::debug;

use crate::model::{LocationSummary, TrafficReading, WeatherReading};
use crate::transform::matching::{nearest_weather, parse_point, resolve_location};
use crate::transform::utility::mean;

/// Rows sharing a location and the attributes of their matched weather row.
type GroupKey = (String, Option<String>, Option<OrderedFloat<f64>>);

struct Group {
    key: GroupKey,
    first_captured_at: DateTime<Utc>,
    transit_minutes: Vec<f64>,
    confidences: Vec<f64>,
}

/// Joins every traffic row to its nearest-in-time weather row and collapses
/// the result into one [`LocationSummary`] per group.
///
/// Traffic rows are visited in capture order, so the representative
/// timestamp of a group is its earliest member and groups come out in the
/// order they were first seen. Traffic whose point matches no weather
/// coordinates is dropped.
pub fn summarize(
    traffic: &[TrafficReading],
    weather: &[WeatherReading],
    transformed_at: DateTime<Utc>,
) -> Vec<LocationSummary> {
    let mut weather_by_time: Vec<&WeatherReading> = weather.iter().collect();
    weather_by_time.sort_by_key(|w| w.captured_at);

    let mut traffic_by_time: Vec<&TrafficReading> = traffic.iter().collect();
    traffic_by_time.sort_by_key(|t| t.captured_at);

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut unmatched = 0usize;

    for t in traffic_by_time {
        let matched = parse_point(&t.point)
            .and_then(|(lat, lon)| resolve_location(lat, lon, &weather_by_time))
            .and_then(|name| nearest_weather(name, t.captured_at, &weather_by_time));

        let Some(w) = matched else {
            unmatched += 1;
            continue;
        };
        let Some(name) = w.location_name.clone() else {
            unmatched += 1;
            continue;
        };

        let key: GroupKey = (
            name,
            w.description.clone(),
            w.temperature_celsius.map(OrderedFloat),
        );

        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(Group {
                key,
                first_captured_at: t.captured_at,
                transit_minutes: Vec::new(),
                confidences: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        if let Some(seconds) = t.current_travel_time_seconds {
            group.transit_minutes.push(seconds / 60.0);
        }
        if let Some(confidence) = t.confidence {
            group.confidences.push(confidence);
        }
    }

    if unmatched > 0 {
        debug!(unmatched, "Traffic rows without a matching weather location");
    }

    groups
        .into_iter()
        .map(|g| {
            let (location_name, weather_description, temperature) = g.key;
            LocationSummary {
                location_name,
                avg_transit_time_minutes: mean(&g.transit_minutes),
                avg_confidence: mean(&g.confidences),
                weather_description,
                temperature_celsius: temperature.map(|t| t.into_inner()),
                representative_traffic_timestamp: g.first_captured_at,
                transformed_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn traffic(point: &str, secs: i64, travel: Option<f64>, confidence: Option<f64>) -> TrafficReading {
        TrafficReading {
            road_class: Some("FRC0".into()),
            current_speed: Some(40.0),
            free_flow_speed: Some(50.0),
            current_travel_time_seconds: travel,
            free_flow_travel_time_seconds: Some(100.0),
            confidence,
            road_closed: false,
            point: point.to_string(),
            captured_at: at(secs),
        }
    }

    fn weather(name: &str, lat: f64, lon: f64, secs: i64, desc: &str, temp: f64) -> WeatherReading {
        WeatherReading {
            latitude: lat,
            longitude: lon,
            location_name: Some(name.to_string()),
            temperature_celsius: Some(temp),
            description: Some(desc.to_string()),
            icon: None,
            captured_at: at(secs),
        }
    }

    #[test]
    fn test_two_segments_one_location() {
        let traffic_rows = vec![
            traffic("10.0,20.0", 0, Some(120.0), Some(1.0)),
            traffic("10.0,20.0", 5, Some(180.0), Some(0.8)),
        ];
        let weather_rows = vec![weather("X", 10.0, 20.0, 0, "Clear", 25.0)];
        let run = at(60);

        let out = summarize(&traffic_rows, &weather_rows, run);

        assert_eq!(out.len(), 1);
        let row = &out[0];
        assert_eq!(row.location_name, "X");
        assert!((row.avg_transit_time_minutes.unwrap() - 2.5).abs() < 1e-9);
        assert!((row.avg_confidence.unwrap() - 0.9).abs() < 1e-9);
        assert_eq!(row.weather_description.as_deref(), Some("Clear"));
        assert_eq!(row.temperature_celsius, Some(25.0));
        assert_eq!(row.representative_traffic_timestamp, at(0));
        assert_eq!(row.transformed_at, run);
    }

    #[test]
    fn test_nearest_in_time_weather_is_used() {
        let traffic_rows = vec![traffic("10.0,20.0", 100, Some(60.0), Some(1.0))];
        let weather_rows = vec![
            weather("X", 10.0, 20.0, 140, "Rain", 18.0),
            weather("X", 10.0, 20.0, 90, "Sun", 30.0),
        ];

        let out = summarize(&traffic_rows, &weather_rows, at(200));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].weather_description.as_deref(), Some("Sun"));
        assert_eq!(out[0].temperature_celsius, Some(30.0));
    }

    #[test]
    fn test_unmatched_point_contributes_nothing() {
        let traffic_rows = vec![
            traffic("1.0,1.0", 0, Some(60.0), Some(1.0)),
            traffic("garbage", 0, Some(60.0), Some(1.0)),
        ];
        let weather_rows = vec![weather("X", 10.0, 20.0, 0, "Clear", 25.0)];

        assert!(summarize(&traffic_rows, &weather_rows, at(10)).is_empty());
    }

    #[test]
    fn test_different_matched_weather_splits_group() {
        // Two readings for X far apart in time each match a different
        // weather capture, so they land in separate summary rows.
        let traffic_rows = vec![
            traffic("10.0,20.0", 0, Some(60.0), Some(1.0)),
            traffic("10.0,20.0", 1000, Some(120.0), Some(0.5)),
        ];
        let weather_rows = vec![
            weather("X", 10.0, 20.0, 0, "Clear", 25.0),
            weather("X", 10.0, 20.0, 1000, "Storm", 19.0),
        ];

        let out = summarize(&traffic_rows, &weather_rows, at(2000));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].weather_description.as_deref(), Some("Clear"));
        assert_eq!(out[0].avg_transit_time_minutes, Some(1.0));
        assert_eq!(out[1].weather_description.as_deref(), Some("Storm"));
        assert_eq!(out[1].avg_transit_time_minutes, Some(2.0));
    }

    #[test]
    fn test_multiple_locations_in_first_seen_order() {
        let traffic_rows = vec![
            traffic("2.0,2.0", 10, Some(60.0), Some(1.0)),
            traffic("1.0,1.0", 0, Some(120.0), Some(1.0)),
        ];
        let weather_rows = vec![
            weather("A", 1.0, 1.0, 0, "Clear", 20.0),
            weather("B", 2.0, 2.0, 0, "Clear", 20.0),
        ];

        let out = summarize(&traffic_rows, &weather_rows, at(100));
        let names: Vec<&str> = out.iter().map(|s| s.location_name.as_str()).collect();

        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_null_metrics_are_skipped_in_averages() {
        let traffic_rows = vec![
            traffic("10.0,20.0", 0, None, None),
            traffic("10.0,20.0", 1, Some(90.0), None),
        ];
        let weather_rows = vec![weather("X", 10.0, 20.0, 0, "Clear", 25.0)];

        let out = summarize(&traffic_rows, &weather_rows, at(10));

        assert_eq!(out[0].avg_transit_time_minutes, Some(1.5));
        assert_eq!(out[0].avg_confidence, None);
    }

    #[test]
    fn test_name_resolution_uses_coordinates_then_name() {
        // The point resolves to "X" by coordinates; a later "X" reading
        // taken elsewhere is still a candidate for the time match.
        let traffic_rows = vec![traffic("10.0,20.0", 500, Some(60.0), Some(1.0))];
        let weather_rows = vec![
            weather("X", 10.0, 20.0, 0, "Clear", 25.0),
            weather("X", 10.5, 20.5, 490, "Fog", 12.0),
        ];

        let out = summarize(&traffic_rows, &weather_rows, at(600));
        assert_eq!(out[0].weather_description.as_deref(), Some("Fog"));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(summarize(&[], &[], at(0)).is_empty());
    }
}
