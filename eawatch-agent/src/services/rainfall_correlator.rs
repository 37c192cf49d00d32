//! Rainfall correlation
//!
//! Rainfall readings are fetched once per cycle; this correlator aggregates
//! them per cluster in memory, avoiding redundant upstream calls.

use chrono::{DateTime, Duration, Utc};

use eawatch_common::geo;

use crate::config::AgentConfig;
use crate::models::{RainfallCategory, RainfallSummary, Reading};

pub struct RainfallCorrelator {
    radius_km: f64,
    window: Duration,
    heavy_mm: f64,
    moderate_mm: f64,
}

impl RainfallCorrelator {
    pub fn new(radius_km: f64, window: Duration, heavy_mm: f64, moderate_mm: f64) -> Self {
        Self {
            radius_km,
            window,
            heavy_mm,
            moderate_mm,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            config.rainfall_correlation_radius_km,
            Duration::hours(config.rainfall_window_hours),
            config.rainfall_heavy_mm,
            config.rainfall_moderate_mm,
        )
    }

    /// Aggregate rainfall around a centroid: gauges within the search radius
    /// whose reading falls inside the window ending at `now`.
    pub fn summarise(
        &self,
        rainfall: &[Reading],
        centroid: (f64, f64),
        now: DateTime<Utc>,
    ) -> RainfallSummary {
        let cutoff = now - self.window;

        let mut total_mm = 0.0f64;
        let mut max_mm = 0.0f64;
        let mut stations = std::collections::HashSet::new();

        for reading in rainfall {
            let (Some(lat), Some(lon)) = (reading.lat, reading.lon) else {
                continue;
            };
            if reading.timestamp < cutoff || reading.timestamp > now {
                continue;
            }
            if geo::haversine_km(centroid.0, centroid.1, lat, lon) > self.radius_km {
                continue;
            }
            total_mm += reading.value;
            max_mm = max_mm.max(reading.value);
            stations.insert(reading.station_id.as_str());
        }

        let category = if total_mm >= self.heavy_mm {
            RainfallCategory::Heavy
        } else if total_mm >= self.moderate_mm {
            RainfallCategory::Moderate
        } else if total_mm > 0.0 {
            RainfallCategory::Light
        } else {
            RainfallCategory::None
        };

        RainfallSummary {
            total_mm,
            max_mm,
            station_count: stations.len(),
            category,
        }
    }
}
