//! Current-conditions extraction from the weather API.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::fetch::{HttpClient, fetch_text};
use crate::model::{Location, WeatherReading};

/// Builds the weather request URL for `location`.
///
/// Fails if the location has no latitude or longitude; that is a
/// configuration mistake, not something to skip over.
pub fn build_weather_url(base_url: &str, location: &Location, extra: &[(&str, &str)]) -> Result<Url> {
    let (lat, lon) = location.coordinates()?;
    let mut url = Url::parse(base_url)?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("lat", &lat.to_string())
            .append_pair("lon", &lon.to_string())
            .append_pair("sections", "all")
            .append_pair("timezone", "UTC")
            .append_pair("language", "en")
            .append_pair("units", "metric");
        for (name, value) in extra {
            query.append_pair(name, value);
        }
    }

    Ok(url)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// Decodes a weather response body into at most one reading.
///
/// Returns `Ok(None)` when the `current` section is missing or empty, and an
/// error when the body is not a JSON object.
pub fn parse_weather_json(
    body: &str,
    location: &Location,
    captured_at: DateTime<Utc>,
) -> Result<Option<WeatherReading>> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let (latitude, longitude) = location.coordinates()?;
    let data: Value = serde_json::from_str(body)?;
    let Value::Object(root) = data else {
        bail!("expected a JSON object at the top level");
    };

    let current = match root.get("current") {
        Some(Value::Object(current)) if !current.is_empty() => current,
        _ => return Ok(None),
    };

    Ok(Some(WeatherReading {
        latitude,
        longitude,
        location_name: location.name.clone(),
        temperature_celsius: current.get("temperature").and_then(number),
        description: current.get("summary").and_then(string),
        icon: current.get("icon").and_then(string),
        captured_at,
    }))
}

/// Fetches and decodes current conditions for one location.
///
/// # Errors
///
/// Only configuration errors (missing coordinates) are returned. Transport,
/// HTTP and decode failures are logged and produce `Ok(None)`.
#[tracing::instrument(skip_all, fields(location = %location.display_name()))]
pub async fn extract_location<C: HttpClient>(
    client: &C,
    config: &Config,
    location: &Location,
) -> Result<Option<WeatherReading>> {
    let url = build_weather_url(&config.weather_base_url, location, &[])?;
    debug!(url = %url, "Fetching current weather");

    let body = match fetch_text(client, url).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Weather fetch failed, skipping location");
            return Ok(None);
        }
    };

    match parse_weather_json(&body, location, Utc::now()) {
        Ok(Some(reading)) => Ok(Some(reading)),
        Ok(None) => {
            warn!("'current' section missing or empty in weather response");
            Ok(None)
        }
        Err(e) => {
            warn!(error = %e, "Malformed weather response, skipping location");
            Ok(None)
        }
    }
}

/// Extracts one reading per location, in order.
#[tracing::instrument(skip_all, fields(locations = locations.len()))]
pub async fn extract_weather<C: HttpClient>(
    client: &C,
    config: &Config,
    locations: &[Location],
) -> Result<Vec<WeatherReading>> {
    if locations.is_empty() {
        warn!("No weather locations configured");
        return Ok(Vec::new());
    }

    let mut readings = Vec::with_capacity(locations.len());
    let mut failed = Vec::new();
    for location in locations {
        match extract_location(client, config, location).await? {
            Some(reading) => readings.push(reading),
            None => failed.push(location.display_name()),
        }
    }

    if failed.is_empty() {
        info!(extracted = readings.len(), "Weather extraction finished");
    } else {
        warn!(
            extracted = readings.len(),
            requested = locations.len(),
            failed = %failed.join(", "),
            "Weather extraction finished with skipped locations"
        );
    }
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;
    use crate::fetch::canned::CannedClient;
    use chrono::TimeZone;
    use std::time::Duration;

    const DEFAULT_BASE: &str = crate::config::DEFAULT_WEATHER_BASE_URL;

    fn london() -> Location {
        Location::new(51.5074, -0.1278, "London")
    }

    #[test]
    fn test_build_weather_url_params() {
        let url = build_weather_url(
            "https://api.exampleweather.com/v1/current",
            &london(),
            &[("extra", "1")],
        )
        .unwrap();

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| {
            pairs
                .iter()
                .find(|(name, _)| name == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("lat"), Some("51.5074"));
        assert_eq!(get("lon"), Some("-0.1278"));
        assert_eq!(get("sections"), Some("all"));
        assert_eq!(get("timezone"), Some("UTC"));
        assert_eq!(get("language"), Some("en"));
        assert_eq!(get("units"), Some("metric"));
        assert_eq!(get("extra"), Some("1"));
        assert_eq!(get("key"), None);
    }

    #[test]
    fn test_build_weather_url_missing_coordinates() {
        let location = Location {
            latitude: None,
            longitude: Some(1.0),
            name: Some("Nowhere".into()),
        };
        assert!(build_weather_url("http://example.test", &location, &[]).is_err());
    }

    #[test]
    fn test_parse_valid_json() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let body = r#"{"current": {"temperature": 18.5, "summary": "Overcast", "icon": "cloudy"}}"#;

        let reading = parse_weather_json(body, &london(), ts).unwrap().unwrap();

        assert_eq!(reading.latitude, 51.5074);
        assert_eq!(reading.longitude, -0.1278);
        assert_eq!(reading.location_name.as_deref(), Some("London"));
        assert_eq!(reading.temperature_celsius, Some(18.5));
        assert_eq!(reading.description.as_deref(), Some("Overcast"));
        assert_eq!(reading.icon.as_deref(), Some("cloudy"));
        assert_eq!(reading.captured_at, ts);
    }

    #[test]
    fn test_parse_numeric_string_temperature() {
        let body = r#"{"current": {"temperature": "21", "summary": "Sunny"}}"#;
        let reading = parse_weather_json(body, &london(), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(reading.temperature_celsius, Some(21.0));
        assert_eq!(reading.icon, None);

        let body = r#"{"current": {"temperature": "warm"}}"#;
        let reading = parse_weather_json(body, &london(), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(reading.temperature_celsius, None);
    }

    #[test]
    fn test_parse_missing_or_empty_current() {
        let now = Utc::now();
        assert_eq!(parse_weather_json(r#"{"hourly": {}}"#, &london(), now).unwrap(), None);
        assert_eq!(parse_weather_json(r#"{"current": {}}"#, &london(), now).unwrap(), None);
        assert_eq!(parse_weather_json(r#"{"current": null}"#, &london(), now).unwrap(), None);
    }

    #[test]
    fn test_parse_empty_or_malformed_body() {
        let now = Utc::now();
        assert_eq!(parse_weather_json("", &london(), now).unwrap(), None);
        assert!(parse_weather_json("{not json", &london(), now).is_err());
        assert!(parse_weather_json("[1, 2]", &london(), now).is_err());
    }

    #[tokio::test]
    async fn test_extract_location_unreachable_returns_none() {
        let mut config = Config::default();
        config.weather_base_url = "http://127.0.0.1:9/current".to_string();
        let client = BasicClient::with_timeout(Duration::from_secs(2)).unwrap();

        let result = extract_location(&client, &config, &london()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_extract_location_missing_coordinates_is_error() {
        let config = Config::default();
        let client = BasicClient::new();
        let location = Location {
            latitude: Some(1.0),
            longitude: None,
            name: None,
        };

        assert!(extract_location(&client, &config, &location).await.is_err());
    }

    #[tokio::test]
    async fn test_extract_location_decodes_and_tags() {
        let config = Config::default();
        let client =
            CannedClient::ok(r#"{"current": {"temperature": 14.0, "summary": "Rain", "icon": "rain"}}"#);

        let reading = extract_location(&client, &config, &london())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reading.location_name.as_deref(), Some("London"));
        assert_eq!((reading.latitude, reading.longitude), (51.5074, -0.1278));
        assert_eq!(reading.temperature_celsius, Some(14.0));
        assert_eq!(reading.description.as_deref(), Some("Rain"));

        let requested = client.requested.lock().unwrap();
        assert!(requested[0].as_str().starts_with(DEFAULT_BASE));
    }

    #[tokio::test]
    async fn test_extract_location_error_status_returns_none() {
        let config = Config::default();
        let client = CannedClient::new(503, r#"{"current": {"temperature": 1.0}}"#);

        assert!(extract_location(&client, &config, &london()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extract_location_empty_or_malformed_body_returns_none() {
        let config = Config::default();

        for body in ["", "{not json", r#"{"current": {}}"#] {
            let client = CannedClient::ok(body);
            assert!(extract_location(&client, &config, &london()).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_extract_weather_skips_nothing_on_success() {
        let config = Config::default();
        let client = CannedClient::ok(r#"{"current": {"summary": "Clear"}}"#);
        let locations = vec![london(), Location::new(40.7128, -74.0060, "New York City")];

        let readings = extract_weather(&client, &config, &locations).await.unwrap();

        let names: Vec<_> = readings.iter().map(|r| r.location_name.as_deref()).collect();
        assert_eq!(names, vec![Some("London"), Some("New York City")]);
    }
}
