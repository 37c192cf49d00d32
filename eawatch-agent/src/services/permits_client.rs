//! Public-registers permit search client
//!
//! Queries the permits registry for sites near a point (British National Grid
//! easting/northing) and annotates each permit with its straight-line
//! distance to the incident centroid. The registry answers in CSV.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use eawatch_common::{geo, Error, Result};

use crate::config::PermitsConfig;
use crate::models::{Permit, PermitCategory};
use crate::util::{classify_reqwest, retry, RetryPolicy};

use super::geocode_client::GeocodeClient;

const USER_AGENT: &str = concat!("eawatch/", env!("CARGO_PKG_VERSION"));

/// At most this many permits are attached to one incident; the registry can
/// return hundreds of rows near urban centroids.
const MAX_PERMITS_PER_SEARCH: usize = 10;

/// Outcome of one permit search.
pub struct PermitSearch {
    pub permits: Vec<Permit>,
    pub api_calls: usize,
    pub geocode_calls: usize,
}

pub struct PermitsClient {
    http: reqwest::Client,
    config: PermitsConfig,
    retry: RetryPolicy,
    geocode: GeocodeClient,
}

impl PermitsClient {
    pub fn new(config: PermitsConfig, geocode: GeocodeClient) -> Result<Self> {
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
            geocode,
        })
    }

    /// Search for permits within `radius_km` of a point.
    ///
    /// `centroid` is the incident centroid in (lat, lon); `easting` and
    /// `northing` locate the same point on the national grid for the registry
    /// query. An empty result on HTTP success is a valid answer.
    pub async fn search_near(
        &self,
        centroid: (f64, f64),
        easting: i64,
        northing: i64,
        radius_km: f64,
    ) -> Result<PermitSearch> {
        let url = format!("{}/api/search.csv", self.config.base_url);
        let calls = AtomicUsize::new(0);

        let csv_text = retry(&self.retry, "permit search", || {
            calls.fetch_add(1, Ordering::Relaxed);
            let request = self.http.get(&url).query(&[
                ("easting", easting.to_string()),
                ("northing", northing.to_string()),
                ("dist", radius_km.to_string()),
            ]);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| classify_reqwest(e, "permit search"))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::from_status(status.as_u16(), "permit search"));
                }
                response.text().await.map_err(|e| Error::TerminalUpstream {
                    status: None,
                    message: format!("permit search: failed to read body: {e}"),
                })
            }
        })
        .await?;

        let mut permits = parse_csv(&csv_text);
        if permits.len() > MAX_PERMITS_PER_SEARCH {
            tracing::debug!(
                total = permits.len(),
                kept = MAX_PERMITS_PER_SEARCH,
                "Truncating permit search results"
            );
            permits.truncate(MAX_PERMITS_PER_SEARCH);
        }

        // Backfill coordinates and distances via geocoding where the registry
        // gave us neither.
        let mut geocode_calls = 0usize;
        for permit in &mut permits {
            if permit.distance_km.is_some() {
                continue;
            }
            let Some(postcode) = permit.site_postcode.clone() else {
                continue;
            };
            geocode_calls += 1;
            match self.geocode.lookup_postcode(&postcode).await {
                Ok(Some((lat, lon))) => {
                    permit.lat = Some(lat);
                    permit.lon = Some(lon);
                    permit.distance_km =
                        Some(geo::haversine_km(centroid.0, centroid.1, lat, lon));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(postcode = %postcode, error = %e, "Geocode lookup failed");
                }
            }
        }

        tracing::debug!(
            permits = permits.len(),
            geocode_calls,
            "Permit search complete"
        );

        Ok(PermitSearch {
            permits,
            api_calls: calls.into_inner(),
            geocode_calls,
        })
    }
}

/// Parse the registry's CSV answer into permits.
///
/// The header row names the columns; site addresses routinely contain commas,
/// so fields are split with quote handling rather than a bare `split(',')`.
pub(crate) fn parse_csv(text: &str) -> Vec<Permit> {
    let mut lines = text.lines();
    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let headers = split_csv_line(header_line);
    let index_of = |name: &str| headers.iter().position(|h| h == name);

    let idx_registration = index_of("registrationNumber");
    let idx_id = index_of("@id");
    let idx_holder = index_of("holder.name");
    let idx_register = index_of("register.label");
    let idx_type = index_of("registrationType.label");
    let idx_address = index_of("site.siteAddress.address");
    let idx_postcode = index_of("site.siteAddress.postcode");
    let idx_distance = index_of("distance");

    let field = |fields: &[String], idx: Option<usize>| -> Option<String> {
        let value = fields.get(idx?)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    };

    let mut permits = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_csv_line(line);

        let Some(permit_id) =
            field(&fields, idx_registration).or_else(|| field(&fields, idx_id))
        else {
            continue;
        };
        let operator =
            field(&fields, idx_holder).unwrap_or_else(|| "Unknown operator".to_string());
        let register_label = field(&fields, idx_register);
        let type_label = field(&fields, idx_type);
        let distance_km = field(&fields, idx_distance).and_then(|d| d.parse::<f64>().ok());

        let category = type_label
            .as_deref()
            .or(register_label.as_deref())
            .map(PermitCategory::from_label)
            .unwrap_or(PermitCategory::Other);

        permits.push(Permit {
            permit_id,
            operator,
            category,
            type_label: type_label.or(register_label),
            site_address: field(&fields, idx_address),
            site_postcode: field(&fields, idx_postcode),
            lat: None,
            lon: None,
            distance_km,
        });
    }
    permits
}

/// Split one CSV line into fields, honouring double-quoted fields and the
/// `""` escape inside them.
pub(crate) fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
