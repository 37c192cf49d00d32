//! Rainfall gauge readings client
//!
//! Rainfall readings share the flood-monitoring API shape. They bypass
//! anomaly detection; the correlator aggregates them per cluster in memory,
//! so the upstream is hit once per cycle. Gauges missing from the rainfall
//! station set are looked up again under the flood source, where some gauges
//! are registered.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use eawatch_common::{Error, Result};

use crate::config::FetcherConfig;
use crate::db::StationMetadataStore;
use crate::models::{Reading, Source};
use crate::util::{classify_reqwest, retry, RetryPolicy};

use super::flood_client::{parse_items, FetchResult};

const USER_AGENT: &str = concat!("eawatch/", env!("CARGO_PKG_VERSION"));

pub struct RainfallClient {
    http: reqwest::Client,
    config: FetcherConfig,
    retry: RetryPolicy,
}

impl RainfallClient {
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

    /// Fetch the latest snapshot of rainfall gauge readings.
    pub async fn fetch_latest(&self, stations: &StationMetadataStore) -> Result<FetchResult> {
        let url = format!("{}/data/readings", self.config.base_url);
        let calls = AtomicUsize::new(0);

        let body: serde_json::Value = retry(&self.retry, "rainfall readings", || {
            calls.fetch_add(1, Ordering::Relaxed);
            let request = self.http.get(&url).query(&[
                ("latest", ""),
                ("parameter", self.config.parameter.as_str()),
            ]);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| classify_reqwest(e, "rainfall readings"))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::from_status(status.as_u16(), "rainfall readings"));
                }
                response.json().await.map_err(|e| Error::TerminalUpstream {
                    status: None,
                    message: format!("rainfall readings: malformed payload: {e}"),
                })
            }
        })
        .await?;

        let raw = parse_items(&body);
        tracing::debug!(count = raw.len(), "Parsed rainfall readings");

        let station_ids: Vec<String> = {
            let mut ids: Vec<String> = raw.iter().map(|r| r.station_id.clone()).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let mut meta = stations.lookup_batch(Source::Rainfall, &station_ids).await?;

        // Some gauges are only registered under the flood source
        let missing: Vec<String> = station_ids
            .iter()
            .filter(|id| !meta.contains_key(*id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            let fallback = stations.lookup_batch(Source::Flood, &missing).await?;
            meta.extend(fallback);
        }

        let readings = raw
            .into_iter()
            .map(|r| {
                let station = meta.get(&r.station_id);
                Reading {
                    station_id: r.station_id,
                    value: r.value,
                    timestamp: r.timestamp,
                    parameter: self.config.parameter.clone(),
                    source: Source::Rainfall,
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
