//! Flood-monitoring readings client
//!
//! Fetches the latest river-level readings from the flood-monitoring API and
//! enriches them with station coordinates in a single batch lookup. Readings
//! whose station is unknown are retained coordinate-less; they are filtered
//! out before clustering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use eawatch_common::{Error, Result};

use crate::config::FetcherConfig;
use crate::db::StationMetadataStore;
use crate::models::{Reading, Source};
use crate::util::{classify_reqwest, extract_station_id, retry, RetryPolicy};

const USER_AGENT: &str = concat!("eawatch/", env!("CARGO_PKG_VERSION"));

/// Outcome of one fetch, including how many upstream HTTP calls were issued
/// (retries included).
pub struct FetchResult {
    pub readings: Vec<Reading>,
    pub api_calls: usize,
}

/// A reading parsed from the payload but not yet joined to station metadata.
#[derive(Debug, PartialEq)]
pub(crate) struct RawReading {
    pub station_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct FloodClient {
    http: reqwest::Client,
    config: FetcherConfig,
    retry: RetryPolicy,
}

impl FloodClient {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;
        let retry = RetryPolicy::new(config.max_retries);

        Ok(Self {
            http,
            config,
            retry,
        })
    }

    /// Fetch the latest snapshot of river-level readings per station.
    pub async fn fetch_latest(&self, stations: &StationMetadataStore) -> Result<FetchResult> {
        let url = format!("{}/data/readings", self.config.base_url);
        let calls = AtomicUsize::new(0);

        let body: serde_json::Value = retry(&self.retry, "flood readings", || {
            calls.fetch_add(1, Ordering::Relaxed);
            let request = self.http.get(&url).query(&[
                ("latest", ""),
                ("parameter", self.config.parameter.as_str()),
            ]);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| classify_reqwest(e, "flood readings"))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::from_status(status.as_u16(), "flood readings"));
                }
                response.json().await.map_err(|e| Error::TerminalUpstream {
                    status: None,
                    message: format!("flood readings: malformed payload: {e}"),
                })
            }
        })
        .await?;

        let raw = parse_items(&body);
        tracing::debug!(count = raw.len(), "Parsed flood readings");

        let station_ids: Vec<String> = {
            let mut ids: Vec<String> = raw.iter().map(|r| r.station_id.clone()).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let meta = stations.lookup_batch(Source::Flood, &station_ids).await?;

        let readings = raw
            .into_iter()
            .map(|r| {
                let station = meta.get(&r.station_id);
                Reading {
                    station_id: r.station_id,
                    value: r.value,
                    timestamp: r.timestamp,
                    parameter: self.config.parameter.clone(),
                    source: Source::Flood,
                    lat: station.and_then(|s| s.lat),
                    lon: station.and_then(|s| s.lon),
                    easting: station.and_then(|s| s.easting),
                    northing: station.and_then(|s| s.northing),
                }
            })
            .collect();

        Ok(FetchResult {
            readings,
            api_calls: calls.into_inner(),
        })
    }
}

/// Parse the `items` array of a flood-monitoring readings payload.
///
/// Each item carries `measure` (a URL string), `value` and `dateTime`. Items
/// with a missing value, timestamp or measure are dropped silently. The API
/// occasionally returns `value` as an array; the first element is taken.
pub(crate) fn parse_items(body: &serde_json::Value) -> Vec<RawReading> {
    let Some(items) = body.get("items").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut readings = Vec::with_capacity(items.len());
    for item in items {
        let Some(measure_url) = item.get("measure").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(station_id) = extract_station_id(measure_url) else {
            continue;
        };
        let Some(value) = numeric_value(item.get("value")) else {
            continue;
        };
        let Some(timestamp) = item
            .get("dateTime")
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp)
        else {
            continue;
        };

        readings.push(RawReading {
            station_id,
            value,
            timestamp,
        });
    }
    readings
}

pub(crate) fn numeric_value(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::Array(arr) => arr.first().and_then(|v| v.as_f64()),
        _ => None,
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_items() {
        let body = json!({
            "items": [
                {
                    "measure": "https://environment.data.gov.uk/flood-monitoring/id/measures/531160-level-stage-i-15_min-mASD",
                    "value": 3.97,
                    "dateTime": "2026-07-01T11:45:00Z"
                },
                {
                    "measure": "https://environment.data.gov.uk/flood-monitoring/id/measures/52119-level-stage-i-15_min-mASD",
                    "value": [3.74, 3.70],
                    "dateTime": "2026-07-01T11:30:00Z"
                },
                // Missing value: dropped
                {
                    "measure": "https://environment.data.gov.uk/flood-monitoring/id/measures/9999-level",
                    "dateTime": "2026-07-01T11:30:00Z"
                },
                // Missing measure: dropped
                { "value": 1.0, "dateTime": "2026-07-01T11:30:00Z" }
            ]
        });

        let readings = parse_items(&body);
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].station_id, "531160");
        assert_eq!(readings[0].value, 3.97);
        assert_eq!(readings[1].station_id, "52119");
        assert_eq!(readings[1].value, 3.74);
    }

    #[test]
    fn test_parse_items_empty_payload() {
        assert!(parse_items(&json!({})).is_empty());
        assert!(parse_items(&json!({"items": []})).is_empty());
    }

    #[test]
    fn test_parse_timestamp_offsets() {
        assert!(parse_timestamp("2026-07-01T11:45:00Z").is_some());
        assert!(parse_timestamp("2026-07-01T11:45:00+01:00").is_some());
        assert!(parse_timestamp("not a timestamp").is_none());
    }
}
