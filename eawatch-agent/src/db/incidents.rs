//! Incident document store with windowed dedup
//!
//! Incidents are stored one JSONB document per incident, with typed columns
//! for the fields dedup and retention queries filter on. The dedup check and
//! insert are serialised per content hash with a transaction-scoped advisory
//! lock, so concurrent calls with the same hash result in exactly one write.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use eawatch_common::{Error, Result};

use crate::config::AgentConfig;
use crate::models::Incident;

/// Result of a dedup-aware store attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOutcome {
    /// Whether this call wrote the incident
    pub stored: bool,
    /// The surviving incident id: the new one when stored, the original's
    /// when a duplicate was found inside the window
    pub effective_id: Uuid,
}

pub struct IncidentStore {
    db: PgPool,
    dedup_window: Duration,
}

impl IncidentStore {
    pub fn new(db: PgPool, dedup_window: Duration) -> Self {
        Self { db, dedup_window }
    }

    pub fn from_config(db: PgPool, config: &AgentConfig) -> Self {
        Self::new(db, Duration::hours(config.dedup_window_hours))
    }

    /// Store the incident unless an incident with the same content hash was
    /// created inside the dedup window.
    pub async fn store_if_new(&self, incident: &Incident) -> Result<StoreOutcome> {
        let window_start = incident.created_at - self.dedup_window;

        let mut tx = self.db.begin().await?;

        // Serialise check+insert per content hash; the lock releases with the
        // transaction.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
            .bind(&incident.content_hash)
            .execute(&mut *tx)
            .await?;

        let existing: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM incidents
            WHERE content_hash = $1 AND created_at >= $2
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(&incident.content_hash)
        .bind(window_start)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((original_id,)) = existing {
            tx.commit().await?;
            tracing::info!(
                incident_id = %incident.incident_id,
                original_id = %original_id,
                content_hash = %incident.content_hash,
                "Duplicate incident inside dedup window, skipping store"
            );
            return Ok(StoreOutcome {
                stored: false,
                effective_id: original_id,
            });
        }

        let doc = serde_json::to_value(incident)
            .map_err(|e| Error::Internal(format!("Failed to serialize incident: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO incidents (id, content_hash, created_at, priority, source_kind, run_id, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(incident.incident_id)
        .bind(&incident.content_hash)
        .bind(incident.created_at)
        .bind(incident.priority.as_str())
        .bind(incident.source_kind.as_str())
        .bind(&incident.run_id)
        .bind(&doc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            incident_id = %incident.incident_id,
            priority = %incident.priority,
            source_kind = %incident.source_kind,
            "Incident stored"
        );

        Ok(StoreOutcome {
            stored: true,
            effective_id: incident.incident_id,
        })
    }

    /// Incidents created since `since`, newest first. Backs the dashboard;
    /// not on the hot path.
    pub async fn recent(&self, since: DateTime<Utc>) -> Result<Vec<Incident>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT doc FROM incidents WHERE created_at >= $1 ORDER BY created_at DESC",
        )
        .bind(since)
        .fetch_all(&self.db)
        .await?;

        let mut incidents = Vec::with_capacity(rows.len());
        for (doc,) in rows {
            let incident: Incident = serde_json::from_value(doc)
                .map_err(|e| Error::Internal(format!("Malformed incident document: {e}")))?;
            incidents.push(incident);
        }
        Ok(incidents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Priority, RainfallSummary, Reading, Source, SourceKind,
    };
    use chrono::TimeZone;

    fn incident() -> Incident {
        Incident {
            incident_id: Uuid::new_v4(),
            content_hash: "ab".repeat(32),
            created_at: Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap(),
            priority: Priority::Medium,
            source_kind: SourceKind::Flood,
            centroid_lat: 51.1,
            centroid_lon: -2.85,
            summary_text: "Elevated river levels at 2 stations".to_string(),
            suggested_actions: vec!["Monitor river levels at A, B".to_string()],
            readings: vec![Reading {
                station_id: "531160".to_string(),
                value: 3.97,
                timestamp: Utc.with_ymd_and_hms(2026, 7, 1, 11, 45, 0).unwrap(),
                parameter: "level".to_string(),
                source: Source::Flood,
                lat: Some(51.08),
                lon: Some(-2.87),
                easting: Some(335000),
                northing: Some(125000),
            }],
            permits: Vec::new(),
            rainfall: RainfallSummary::empty(),
            run_id: "run-1".to_string(),
        }
    }

    /// The JSONB document must survive a round-trip with all fields intact.
    #[test]
    fn test_incident_document_roundtrip() {
        let original = incident();
        let doc = serde_json::to_value(&original).unwrap();
        let back: Incident = serde_json::from_value(doc).unwrap();

        assert_eq!(back.incident_id, original.incident_id);
        assert_eq!(back.content_hash, original.content_hash);
        assert_eq!(back.created_at, original.created_at);
        assert_eq!(back.priority, original.priority);
        assert_eq!(back.source_kind, original.source_kind);
        assert_eq!(back.summary_text, original.summary_text);
        assert_eq!(back.suggested_actions, original.suggested_actions);
        assert_eq!(back.readings.len(), 1);
        assert_eq!(back.readings[0].station_id, "531160");
        assert_eq!(back.readings[0].value, 3.97);
        assert_eq!(back.run_id, original.run_id);
    }
}
