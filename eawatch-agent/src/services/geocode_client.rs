//! Postcode geocoding client
//!
//! Optional enrichment used only to backfill permit site coordinates when
//! the registry response lacks a usable distance. Lookups are single-attempt:
//! a failed geocode degrades to an un-annotated permit, never an error.

use std::time::Duration;

use eawatch_common::{Error, Result};

use crate::config::GeocodeConfig;
use crate::util::classify_reqwest;

const USER_AGENT: &str = concat!("eawatch/", env!("CARGO_PKG_VERSION"));

pub struct GeocodeClient {
    http: reqwest::Client,
    config: GeocodeConfig,
}

impl GeocodeClient {
    pub fn new(config: GeocodeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Resolve a postcode to (lat, lon). Unknown postcodes yield `None`.
    pub async fn lookup_postcode(&self, postcode: &str) -> Result<Option<(f64, f64)>> {
        let url = format!(
            "{}/postcodes/{}",
            self.config.base_url,
            postcode.trim().replace(' ', "")
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_reqwest(e, "geocode"))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), "geocode"));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| Error::TerminalUpstream {
            status: None,
            message: format!("geocode: malformed payload: {e}"),
        })?;

        let result = body.get("result");
        let lat = result.and_then(|r| r.get("latitude")).and_then(|v| v.as_f64());
        let lon = result.and_then(|r| r.get("longitude")).and_then(|v| v.as_f64());

        Ok(match (lat, lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        })
    }
}
