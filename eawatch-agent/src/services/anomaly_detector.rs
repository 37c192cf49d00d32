//! Anomaly detection
//!
//! The detector is a capability trait so the fixed-threshold default can be
//! swapped for e.g. a z-score detector without touching the pipeline.

use std::collections::HashMap;

use crate::config::AgentConfig;
use crate::models::{Anomaly, Reading};

/// Classifies readings as anomalous.
pub trait AnomalyDetector: Send + Sync {
    /// Retain only anomalous readings. Output order is stable with respect
    /// to input order. Readings without coordinates are dropped: they cannot
    /// be clustered.
    fn classify(&self, readings: &[Reading]) -> Vec<Anomaly>;
}

/// Fixed-threshold detector: a reading is anomalous when its value exceeds
/// the threshold configured for its (source, parameter) pair. Pairs without
/// a configured threshold are never anomalous.
pub struct ThresholdDetector {
    /// Keyed by "source:parameter"
    thresholds: HashMap<String, f64>,
}

impl ThresholdDetector {
    pub fn new(thresholds: HashMap<String, f64>) -> Self {
        Self { thresholds }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.anomaly_thresholds.clone())
    }

    fn threshold_for(&self, reading: &Reading) -> Option<f64> {
        self.thresholds
            .get(&format!("{}:{}", reading.source.as_str(), reading.parameter))
            .copied()
    }
}

impl AnomalyDetector for ThresholdDetector {
    fn classify(&self, readings: &[Reading]) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        for reading in readings {
            if !reading.has_coordinates() {
                continue;
            }
            let Some(threshold) = self.threshold_for(reading) else {
                continue;
            };
            if reading.value > threshold {
                anomalies.push(Anomaly {
                    reading: reading.clone(),
                    threshold,
                    classification: "threshold_exceeded".to_string(),
                });
            }
        }
        tracing::debug!(
            readings = readings.len(),
            anomalies = anomalies.len(),
            "Anomaly detection complete"
        );
        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use chrono::{TimeZone, Utc};

    fn reading(source: Source, parameter: &str, value: f64, with_coords: bool) -> Reading {
        Reading {
            station_id: "S1".to_string(),
            value,
            timestamp: Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap(),
            parameter: parameter.to_string(),
            source,
            lat: with_coords.then_some(51.0),
            lon: with_coords.then_some(-2.8),
            easting: None,
            northing: None,
        }
    }

    fn detector() -> ThresholdDetector {
        let mut thresholds = HashMap::new();
        thresholds.insert("flood:level".to_string(), 3.0);
        thresholds.insert("hydrology:flow".to_string(), 50.0);
        ThresholdDetector::new(thresholds)
    }

    #[test]
    fn test_threshold_per_source() {
        let readings = vec![
            reading(Source::Flood, "level", 3.5, true),
            reading(Source::Flood, "level", 2.9, true),
            reading(Source::Hydrology, "flow", 3.5, true),
            reading(Source::Hydrology, "flow", 51.0, true),
        ];
        let anomalies = detector().classify(&readings);
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].reading.value, 3.5);
        assert_eq!(anomalies[0].threshold, 3.0);
        assert_eq!(anomalies[1].reading.value, 51.0);
        assert_eq!(anomalies[1].threshold, 50.0);
    }

    #[test]
    fn test_exact_threshold_is_not_anomalous() {
        let readings = vec![reading(Source::Flood, "level", 3.0, true)];
        assert!(detector().classify(&readings).is_empty());
    }

    #[test]
    fn test_coordinate_less_readings_dropped() {
        let readings = vec![reading(Source::Flood, "level", 9.0, false)];
        assert!(detector().classify(&readings).is_empty());
    }

    #[test]
    fn test_unconfigured_parameter_never_anomalous() {
        let readings = vec![reading(Source::Flood, "temperature", 99.0, true)];
        assert!(detector().classify(&readings).is_empty());
    }

    #[test]
    fn test_output_order_is_stable() {
        let readings = vec![
            reading(Source::Hydrology, "flow", 60.0, true),
            reading(Source::Flood, "level", 4.0, true),
            reading(Source::Hydrology, "flow", 55.0, true),
        ];
        let anomalies = detector().classify(&readings);
        let values: Vec<f64> = anomalies.iter().map(|a| a.reading.value).collect();
        assert_eq!(values, vec![60.0, 4.0, 55.0]);
    }
}
