//! Readings, stations and detected anomalies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream telemetry source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Flood,
    Hydrology,
    Rainfall,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Flood => "flood",
            Source::Hydrology => "hydrology",
            Source::Rainfall => "rainfall",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monitoring station metadata
///
/// Populated out-of-band by the station sync job; read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub source: Source,
    pub station_id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub easting: Option<i64>,
    pub northing: Option<i64>,
    pub label: Option<String>,
}

/// One measurement from an upstream API
///
/// Station coordinates are copied in at fetch time so downstream stages never
/// re-join against station metadata. Readings are ephemeral within a cycle;
/// they are only persisted as part of an incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub station_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub parameter: String,
    pub source: Source,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub easting: Option<i64>,
    pub northing: Option<i64>,
}

impl Reading {
    /// Readings without coordinates cannot be clustered and are filtered out
    /// before detection.
    pub fn has_coordinates(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

/// A reading that satisfied the anomaly detector's predicate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub reading: Reading,
    /// Threshold the detector compared against
    pub threshold: f64,
    /// Detector tag, e.g. "threshold_exceeded"
    pub classification: String,
}

impl Anomaly {
    /// Relative exceedance of the threshold, `|value - threshold| / threshold`.
    ///
    /// Drives priority assignment.
    pub fn exceedance(&self) -> f64 {
        if self.threshold == 0.0 {
            return 0.0;
        }
        (self.reading.value - self.threshold).abs() / self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(value: f64) -> Reading {
        Reading {
            station_id: "531160".to_string(),
            value,
            timestamp: Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap(),
            parameter: "level".to_string(),
            source: Source::Flood,
            lat: Some(51.08),
            lon: Some(-2.87),
            easting: Some(335000),
            northing: Some(125000),
        }
    }

    #[test]
    fn test_exceedance() {
        let anomaly = Anomaly {
            reading: reading(3.97),
            threshold: 3.0,
            classification: "threshold_exceeded".to_string(),
        };
        assert!((anomaly.exceedance() - 0.3233).abs() < 1e-3);
    }

    #[test]
    fn test_exceedance_zero_threshold() {
        let anomaly = Anomaly {
            reading: reading(5.0),
            threshold: 0.0,
            classification: "threshold_exceeded".to_string(),
        };
        assert_eq!(anomaly.exceedance(), 0.0);
    }

    #[test]
    fn test_source_serde_roundtrip() {
        let json = serde_json::to_string(&Source::Hydrology).unwrap();
        assert_eq!(json, "\"hydrology\"");
        let back: Source = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Source::Hydrology);
    }
}
