//! Per-cycle run log
//!
//! One record per cycle capturing counts, timings and errors. The run log is
//! the primary observability surface of the agent; it is written even when a
//! cycle aborts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cluster::SourceKind;

/// Readings fetched per upstream source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadingCounts {
    pub flood: usize,
    pub hydrology: usize,
    pub rainfall: usize,
}

impl ReadingCounts {
    pub fn total(&self) -> usize {
        self.flood + self.hydrology + self.rainfall
    }
}

/// Per-cluster breakdown recorded in the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDetail {
    pub source_kind: SourceKind,
    pub station_count: usize,
    pub center_lat: f64,
    pub center_lon: f64,
}

/// Result of one similarity search against the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilaritySearchResult {
    pub incident_id: Uuid,
    pub neighbours_found: usize,
    pub avg_similarity: f64,
    pub best_similarity: f64,
    pub neighbour_ids: Vec<Uuid>,
}

/// An error captured in one pipeline stage. Stage errors never abort the
/// cycle; they are accumulated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    pub stage: String,
    pub message: String,
}

/// Writes performed per store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreCounts {
    pub documents: usize,
    pub embeddings: usize,
    pub graph: usize,
}

/// External HTTP calls issued during the cycle, per service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiCallCounts {
    pub flood: usize,
    pub hydrology: usize,
    pub rainfall: usize,
    pub permits: usize,
    pub geocode: usize,
    pub embedding: usize,
}

/// One record per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub stations_fetched: usize,
    pub readings_fetched: ReadingCounts,
    pub clusters_found: usize,
    pub cluster_details: Vec<ClusterDetail>,
    pub similarity_searches: usize,
    pub similarity_results: Vec<SimilaritySearchResult>,
    pub incidents_created: usize,
    pub incidents_duplicate: usize,
    pub incident_ids_created: Vec<Uuid>,
    pub incident_ids_duplicate: Vec<Uuid>,
    pub stores: StoreCounts,
    pub errors: Vec<StageError>,
    pub api_calls: ApiCallCounts,
    /// Abort cause when the cycle was cancelled or overran its deadline
    pub aborted: Option<String>,
}

impl AgentRunLog {
    pub fn new(run_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            duration_seconds: 0.0,
            stations_fetched: 0,
            readings_fetched: ReadingCounts::default(),
            clusters_found: 0,
            cluster_details: Vec::new(),
            similarity_searches: 0,
            similarity_results: Vec::new(),
            incidents_created: 0,
            incidents_duplicate: 0,
            incident_ids_created: Vec::new(),
            incident_ids_duplicate: Vec::new(),
            stores: StoreCounts::default(),
            errors: Vec::new(),
            api_calls: ApiCallCounts::default(),
            aborted: None,
        }
    }

    /// Record a stage error without aborting the cycle.
    pub fn record_error(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(stage = %stage, error = %message, "Stage error recorded");
        self.errors.push(StageError {
            stage: stage.to_string(),
            message,
        });
    }
}
