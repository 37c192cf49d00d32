//! Spatial/temporal anomaly clusters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::reading::{Anomaly, Source};

/// Classification of a cluster (and the incident derived from it) by the
/// sources of its member readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Flood,
    Hydrology,
    Mixed,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Flood => "flood",
            SourceKind::Hydrology => "hydrology",
            SourceKind::Mixed => "mixed",
        }
    }

    /// Derive the kind from cluster members: `flood` if every member is a
    /// flood reading, `hydrology` if every member is hydrology, otherwise
    /// `mixed`.
    pub fn of_members(members: &[Anomaly]) -> SourceKind {
        let mut any_flood = false;
        let mut any_hydrology = false;
        for m in members {
            match m.reading.source {
                Source::Flood => any_flood = true,
                _ => any_hydrology = true,
            }
        }
        match (any_flood, any_hydrology) {
            (true, false) => SourceKind::Flood,
            (false, true) => SourceKind::Hydrology,
            _ => SourceKind::Mixed,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-empty group of anomalies passing the spatial and temporal proximity
/// predicates.
///
/// Clusters have no persistent identity; they are values flowing from the
/// clusterer through enrichment into incident composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub members: Vec<Anomaly>,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    pub source_kind: SourceKind,
    /// Earliest member timestamp
    pub window_start: DateTime<Utc>,
    /// Latest member timestamp
    pub window_end: DateTime<Utc>,
}

impl Cluster {
    /// Distinct station ids, sorted.
    pub fn station_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .members
            .iter()
            .map(|m| m.reading.station_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// The member with the highest reading value.
    pub fn peak(&self) -> &Anomaly {
        self.members
            .iter()
            .max_by(|a, b| a.reading.value.total_cmp(&b.reading.value))
            .expect("clusters are non-empty")
    }

    pub fn mean_value(&self) -> f64 {
        let sum: f64 = self.members.iter().map(|m| m.reading.value).sum();
        sum / self.members.len() as f64
    }

    /// Highest relative threshold exceedance across members.
    pub fn max_exceedance(&self) -> f64 {
        self.members
            .iter()
            .map(|m| m.exceedance())
            .fold(0.0, f64::max)
    }
}
