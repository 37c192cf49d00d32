//! Incident composition
//!
//! Builds the persisted incident record from a cluster and its enrichments:
//! priority from threshold exceedance, summary text and actions from the
//! summariser capability, and the content hash the dedup window keys on.

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::models::{Cluster, Incident, Permit, Priority, RainfallSummary, SourceKind};

use super::summariser::{Summariser, SummaryInput};

pub struct IncidentComposer {
    high_exceedance: f64,
    medium_exceedance: f64,
    summariser: Box<dyn Summariser>,
}

impl IncidentComposer {
    pub fn new(
        high_exceedance: f64,
        medium_exceedance: f64,
        summariser: Box<dyn Summariser>,
    ) -> Self {
        Self {
            high_exceedance,
            medium_exceedance,
            summariser,
        }
    }

    pub fn from_config(config: &AgentConfig, summariser: Box<dyn Summariser>) -> Self {
        Self::new(
            config.priority_high_exceedance,
            config.priority_medium_exceedance,
            summariser,
        )
    }

    /// Assemble one incident from an enriched cluster.
    pub fn compose(
        &self,
        cluster: &Cluster,
        permits: Vec<Permit>,
        rainfall: RainfallSummary,
        run_id: &str,
    ) -> Incident {
        let priority = self.priority_for(cluster);
        let content_hash = content_hash(cluster.source_kind, priority, cluster);

        let summary = self.summariser.summarise(&SummaryInput {
            cluster,
            permits: &permits,
            rainfall: &rainfall,
            priority,
        });

        Incident {
            incident_id: Uuid::new_v4(),
            content_hash,
            created_at: Utc::now(),
            priority,
            source_kind: cluster.source_kind,
            centroid_lat: cluster.centroid_lat,
            centroid_lon: cluster.centroid_lon,
            summary_text: summary.text,
            suggested_actions: summary.suggested_actions,
            readings: cluster.members.iter().map(|m| m.reading.clone()).collect(),
            permits,
            rainfall,
            run_id: run_id.to_string(),
        }
    }

    /// Priority is a pure function of the cluster's anomalies: the largest
    /// relative threshold exceedance decides. Rainfall and permits only
    /// change commentary, never priority.
    pub fn priority_for(&self, cluster: &Cluster) -> Priority {
        let max_exceedance = cluster.max_exceedance();
        if max_exceedance >= self.high_exceedance {
            Priority::High
        } else if max_exceedance >= self.medium_exceedance {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

/// SHA-256 fingerprint of the cluster's essential anomaly tuple.
///
/// The hash input is `source_kind | priority | sorted tuples of
/// (station_id, iso timestamp, parameter, value rounded to 3 decimals)`, so
/// reordering the anomalies never changes the hash.
pub fn content_hash(source_kind: SourceKind, priority: Priority, cluster: &Cluster) -> String {
    let mut tuples: Vec<String> = cluster
        .members
        .iter()
        .map(|m| {
            format!(
                "({},{},{},{:.3})",
                m.reading.station_id,
                m.reading
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
                m.reading.parameter,
                m.reading.value,
            )
        })
        .collect();
    tuples.sort();

    let input = format!(
        "{}|{}|{}",
        source_kind.as_str(),
        priority.as_str(),
        tuples.join(";")
    );

    let digest = Sha256::digest(input.as_bytes());
    format!("{digest:x}")
}
