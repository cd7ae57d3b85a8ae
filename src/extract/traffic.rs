//! Traffic flow extraction from the TomTom `flowSegmentData` endpoint.

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::fetch::{HttpClient, fetch_text};
use crate::model::TrafficReading;

pub const DEFAULT_ZOOM: u8 = 10;
pub const DEFAULT_FORMAT: &str = "xml";

/// Scalar fields of a single flow segment, exactly as decoded.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlowSegment {
    pub frc: Option<String>,
    pub current_speed: Option<f64>,
    pub free_flow_speed: Option<f64>,
    pub current_travel_time: Option<f64>,
    pub free_flow_travel_time: Option<f64>,
    pub confidence: Option<f64>,
    pub road_closure: bool,
}

impl FlowSegment {
    pub fn into_reading(self, point: &str, captured_at: DateTime<Utc>) -> TrafficReading {
        TrafficReading {
            road_class: self.frc,
            current_speed: self.current_speed,
            free_flow_speed: self.free_flow_speed,
            current_travel_time_seconds: self.current_travel_time,
            free_flow_travel_time_seconds: self.free_flow_travel_time,
            confidence: self.confidence,
            road_closed: self.road_closure,
            point: point.to_string(),
            captured_at,
        }
    }
}

/// Builds `{base}/{zoom}/{format}?point=<point>&<extra>...`.
///
/// The API key is not part of the URL; it is appended by the client's
/// [`UrlParam`](crate::fetch::auth::UrlParam) wrapper.
pub fn build_traffic_url(
    base_url: &str,
    point: &str,
    zoom: u8,
    format: &str,
    extra: &[(&str, &str)],
) -> Result<Url> {
    let mut url = Url::parse(&format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        zoom,
        format
    ))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("point", point);
        for (name, value) in extra {
            query.append_pair(name, value);
        }
    }

    Ok(url)
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

fn parse_closure(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("true")
}

/// Decodes a flow segment document.
///
/// Only direct children of the root element are considered. Returns
/// `Ok(None)` for an empty body and an error for malformed XML.
pub fn parse_traffic_xml(body: &str) -> Result<Option<FlowSegment>> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut segment = FlowSegment::default();
    let mut closure_text: Option<String> = None;
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut current: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if depth == 0 {
                    if seen_root {
                        bail!("multiple root elements");
                    }
                    seen_root = true;
                } else if depth == 1 {
                    current = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                    text.clear();
                }
                depth += 1;
            }
            Ok(Event::Empty(_)) => {
                if depth == 0 {
                    if seen_root {
                        bail!("multiple root elements");
                    }
                    seen_root = true;
                }
            }
            Ok(Event::Text(t)) => {
                if depth == 0 {
                    bail!("text outside of the root element");
                }
                if depth == 2 && current.is_some() {
                    text.push_str(&t.unescape()?);
                }
            }
            Ok(Event::CData(t)) => {
                if depth == 2 && current.is_some() {
                    text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    bail!("unbalanced closing tag");
                }
                depth -= 1;
                if depth == 1 {
                    if let Some(tag) = current.take() {
                        let value = text.as_str();
                        match tag.as_str() {
                            "frc" => segment.frc = Some(value.to_string()),
                            "currentSpeed" => segment.current_speed = parse_number(value),
                            "freeFlowSpeed" => segment.free_flow_speed = parse_number(value),
                            "currentTravelTime" => {
                                segment.current_travel_time = parse_number(value)
                            }
                            "freeFlowTravelTime" => {
                                segment.free_flow_travel_time = parse_number(value)
                            }
                            "confidence" => segment.confidence = parse_number(value),
                            "roadClosure" => closure_text = Some(value.to_string()),
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(anyhow!("XML error at position {}: {}", reader.buffer_position(), e)),
        }
    }

    if !seen_root {
        bail!("no root element");
    }
    if depth != 0 {
        bail!("unexpected end of document, {} element(s) left open", depth);
    }

    segment.road_closure = closure_text.as_deref().is_some_and(parse_closure);
    Ok(Some(segment))
}

/// Fetches and decodes the flow segment for one point.
///
/// Transport and HTTP failures are logged and yield `None`, as do empty or
/// malformed responses.
#[tracing::instrument(skip(client, config))]
pub async fn extract_point<C: HttpClient>(
    client: &C,
    config: &Config,
    point: &str,
) -> Option<TrafficReading> {
    let url = match build_traffic_url(
        &config.traffic_base_url,
        point,
        DEFAULT_ZOOM,
        DEFAULT_FORMAT,
        &[],
    ) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Could not build traffic URL, skipping point");
            return None;
        }
    };
    debug!(url = %url, "Fetching traffic flow");

    let body = match fetch_text(client, url).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Traffic fetch failed, skipping point");
            return None;
        }
    };

    match parse_traffic_xml(&body) {
        Ok(Some(segment)) => Some(segment.into_reading(point, Utc::now())),
        Ok(None) => {
            warn!("Empty traffic response, skipping point");
            None
        }
        Err(e) => {
            warn!(error = %e, "Malformed traffic response, skipping point");
            None
        }
    }
}

/// Extracts one reading per point, in order, skipping points that fail.
#[tracing::instrument(skip_all, fields(points = points.len()))]
pub async fn extract_traffic<C: HttpClient>(
    client: &C,
    config: &Config,
    points: &[String],
) -> Vec<TrafficReading> {
    if points.is_empty() {
        warn!("No traffic points configured");
        return Vec::new();
    }

    let mut readings = Vec::with_capacity(points.len());
    for point in points {
        if let Some(reading) = extract_point(client, config, point).await {
            readings.push(reading);
        }
    }

    info!(
        extracted = readings.len(),
        requested = points.len(),
        "Traffic extraction finished"
    );
    readings
}
