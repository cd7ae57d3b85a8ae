//! Runtime configuration, built once at start-up and passed to every stage.
//!
//! Values come from the process environment (after `.env` is loaded by
//! `dotenvy` in `main`). Anything unset falls back to the defaults below.

use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use std::time::Duration;

use crate::model::Location;
use crate::store::validate_table_name;

pub const DEFAULT_TRAFFIC_BASE_URL: &str =
    "https://api.tomtom.com/traffic/services/4/flowSegmentData/absolute";
pub const DEFAULT_WEATHER_BASE_URL: &str = "https://api.exampleweather.com/v1/current";
pub const DEFAULT_DATABASE_PATH: &str = "traffic_data.sqlite";
pub const DEFAULT_REPORT_OUTPUT: &str = "weather_traffic_time_visualization.html";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Names of the three tables the pipeline reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub traffic: String,
    pub weather: String,
    pub summary: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            traffic: "traffic_flow_data".to_string(),
            weather: "weather_data".to_string(),
            summary: "transformed_weather_traffic".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub traffic_api_key: Option<String>,
    pub weather_api_key: Option<String>,
    pub traffic_base_url: String,
    pub weather_base_url: String,
    pub database_path: PathBuf,
    pub tables: TableNames,
    pub api_timeout: Duration,
    pub traffic_points: Vec<String>,
    pub weather_locations: Vec<Location>,
    pub report_output: PathBuf,
}

fn default_points() -> Vec<String> {
    [
        "10.79187,106.68831",
        "10.78792,106.70215",
        "10.79096,106.71560",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_locations() -> Vec<Location> {
    vec![
        Location::new(10.79187, 106.68831, "Ho Chi Minh City"),
        Location::new(40.7128, -74.0060, "New York City"),
        Location::new(51.5074, -0.1278, "London"),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            traffic_api_key: None,
            weather_api_key: None,
            traffic_base_url: DEFAULT_TRAFFIC_BASE_URL.to_string(),
            weather_base_url: DEFAULT_WEATHER_BASE_URL.to_string(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            tables: TableNames::default(),
            api_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            traffic_points: default_points(),
            weather_locations: default_locations(),
            report_output: PathBuf::from(DEFAULT_REPORT_OUTPUT),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        config.traffic_api_key = get("TOMTOM_API_KEY");
        config.weather_api_key = get("WEATHER_API_KEY");

        if let Some(url) = get("TOMTOM_TRAFFIC_API_BASE_URL") {
            config.traffic_base_url = url;
        }
        if let Some(url) = get("WEATHER_API_BASE_URL") {
            config.weather_base_url = url;
        }
        if let Some(path) = get("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(name) = get("TRAFFIC_TABLE_NAME") {
            config.tables.traffic = name;
        }
        if let Some(name) = get("WEATHER_TABLE_NAME") {
            config.tables.weather = name;
        }
        if let Some(name) = get("TRANSFORMED_TABLE_NAME") {
            config.tables.summary = name;
        }
        if let Some(raw) = get("API_TIMEOUT_SECONDS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("API_TIMEOUT_SECONDS must be a whole number, got '{raw}'"))?;
            config.api_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("TRAFFIC_POINTS") {
            config.traffic_points = raw
                .split(';')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = get("WEATHER_LOCATIONS") {
            config.weather_locations = serde_json::from_str(&raw)
                .context("WEATHER_LOCATIONS must be a JSON array of {lat, lon, name} objects")?;
        }
        if let Some(path) = get("REPORT_OUTPUT_FILE") {
            config.report_output = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<()> {
        for name in [&self.tables.traffic, &self.tables.weather, &self.tables.summary] {
            validate_table_name(name)?;
        }
        for location in &self.weather_locations {
            location.coordinates()?;
        }
        if self.api_timeout.is_zero() {
            return Err(anyhow!("API_TIMEOUT_SECONDS must be greater than zero"));
        }
        Ok(())
    }

    pub fn traffic_api_key(&self) -> Result<&str> {
        self.traffic_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("TOMTOM_API_KEY environment variable not set"))
    }

    pub fn weather_api_key(&self) -> Result<&str> {
        self.weather_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("WEATHER_API_KEY environment variable not set"))
    }
}
