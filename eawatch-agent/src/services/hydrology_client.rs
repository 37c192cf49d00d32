//! Hydrology readings client
//!
//! Same flow as the flood client, but the hydrology API wraps the measure
//! reference in an object (`measure.@id`) instead of a bare URL string.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use eawatch_common::{Error, Result};

use crate::config::FetcherConfig;
use crate::db::StationMetadataStore;
use crate::models::{Reading, Source};
use crate::util::{classify_reqwest, extract_station_id, retry, RetryPolicy};

use super::flood_client::{numeric_value, parse_timestamp, FetchResult, RawReading};

const USER_AGENT: &str = concat!("eawatch/", env!("CARGO_PKG_VERSION"));

pub struct HydrologyClient {
    http: reqwest::Client,
    config: FetcherConfig,
    retry: RetryPolicy,
}

impl HydrologyClient {
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

    /// Fetch the latest snapshot of flow readings per station.
    pub async fn fetch_latest(&self, stations: &StationMetadataStore) -> Result<FetchResult> {
        let url = format!("{}/data/readings", self.config.base_url);
        let calls = AtomicUsize::new(0);

        let body: serde_json::Value = retry(&self.retry, "hydrology readings", || {
            calls.fetch_add(1, Ordering::Relaxed);
            let request = self.http.get(&url).query(&[
                ("latest", ""),
                ("parameter", self.config.parameter.as_str()),
            ]);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| classify_reqwest(e, "hydrology readings"))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::from_status(status.as_u16(), "hydrology readings"));
                }
                response.json().await.map_err(|e| Error::TerminalUpstream {
                    status: None,
                    message: format!("hydrology readings: malformed payload: {e}"),
                })
            }
        })
        .await?;

        let raw = parse_items(&body);
        tracing::debug!(count = raw.len(), "Parsed hydrology readings");

        let station_ids: Vec<String> = {
            let mut ids: Vec<String> = raw.iter().map(|r| r.station_id.clone()).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let meta = stations.lookup_batch(Source::Hydrology, &station_ids).await?;

        let readings = raw
            .into_iter()
            .map(|r| {
                let station = meta.get(&r.station_id);
                Reading {
                    station_id: r.station_id,
                    value: r.value,
                    timestamp: r.timestamp,
                    parameter: self.config.parameter.clone(),
                    source: Source::Hydrology,
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

/// Parse the `items` array of a hydrology readings payload.
///
/// `measure` is an object whose `@id` holds the measure URL; the station-id
/// extraction rule is the same as for the flood API.
pub(crate) fn parse_items(body: &serde_json::Value) -> Vec<RawReading> {
    let Some(items) = body.get("items").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut readings = Vec::with_capacity(items.len());
    for item in items {
        let Some(measure_url) = item
            .get("measure")
            .and_then(|m| m.get("@id"))
            .and_then(|v| v.as_str())
        else {
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
