//! Persisted incident records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cluster::SourceKind;
use super::permit::Permit;
use super::rainfall::RainfallSummary;
use super::reading::Reading;

/// Incident priority, derived deterministically from the cluster's anomalies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted unit of work: one cluster plus its enrichments.
///
/// `incident_id` is generated fresh per incident; `content_hash` fingerprints
/// the cluster's essential anomaly tuple and is what the 24h dedup window
/// keys on. Two incidents with the same hash inside the window never both
/// persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: Uuid,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub priority: Priority,
    pub source_kind: SourceKind,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    pub summary_text: String,
    pub suggested_actions: Vec<String>,
    pub readings: Vec<Reading>,
    pub permits: Vec<Permit>,
    pub rainfall: RainfallSummary,
    pub run_id: String,
}
