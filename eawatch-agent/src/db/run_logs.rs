//! Run-log persistence
//!
//! One JSONB row per cycle. Recording never fails the cycle: errors are
//! logged to stderr and swallowed.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use eawatch_common::{Error, Result};

use crate::models::AgentRunLog;

pub struct RunLogRecorder {
    db: PgPool,
}

/// Aggregate statistics over recent runs, for the dashboard.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunStatistics {
    pub total_runs: i64,
    pub incidents_created: i64,
    pub incidents_duplicate: i64,
    pub clusters_found: i64,
    pub avg_duration_seconds: f64,
    pub duplicate_rate: f64,
}

impl RunLogRecorder {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Persist the run log. Errors are reported on stderr only; the cycle
    /// has already done its work and must not fail because bookkeeping did.
    pub async fn record(&self, log: &AgentRunLog) {
        if let Err(e) = self.try_record(log).await {
            tracing::error!(run_id = %log.run_id, error = %e, "Failed to persist run log");
            eprintln!("eawatch: failed to persist run log {}: {e}", log.run_id);
        }
    }

    async fn try_record(&self, log: &AgentRunLog) -> Result<()> {
        let doc = serde_json::to_value(log)
            .map_err(|e| Error::Internal(format!("Failed to serialize run log: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO agent_run_logs (run_id, started_at, doc)
            VALUES ($1, $2, $3)
            ON CONFLICT (run_id) DO UPDATE SET doc = EXCLUDED.doc
            "#,
        )
        .bind(&log.run_id)
        .bind(log.started_at)
        .bind(&doc)
        .execute(&self.db)
        .await?;

        tracing::info!(
            run_id = %log.run_id,
            incidents_created = log.incidents_created,
            incidents_duplicate = log.incidents_duplicate,
            errors = log.errors.len(),
            "Run log saved"
        );
        Ok(())
    }

    /// The most recent runs, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<AgentRunLog>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT doc FROM agent_run_logs ORDER BY started_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let mut logs = Vec::with_capacity(rows.len());
        for (doc,) in rows {
            let log: AgentRunLog = serde_json::from_value(doc)
                .map_err(|e| Error::Internal(format!("Malformed run log document: {e}")))?;
            logs.push(log);
        }
        Ok(logs)
    }

    /// Aggregate statistics over the last `days` days.
    pub async fn statistics(&self, days: i64) -> Result<RunStatistics> {
        let cutoff = Utc::now() - Duration::days(days);

        let row: (i64, i64, i64, i64, f64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM((doc->>'incidents_created')::BIGINT), 0)::BIGINT,
                COALESCE(SUM((doc->>'incidents_duplicate')::BIGINT), 0)::BIGINT,
                COALESCE(SUM((doc->>'clusters_found')::BIGINT), 0)::BIGINT,
                COALESCE(AVG((doc->>'duration_seconds')::DOUBLE PRECISION), 0.0)
            FROM agent_run_logs
            WHERE started_at >= $1
            "#,
        )
        .bind(cutoff)
        .fetch_one(&self.db)
        .await?;

        let (total_runs, incidents_created, incidents_duplicate, clusters_found, avg_duration) =
            row;
        let total_incidents = incidents_created + incidents_duplicate;
        let duplicate_rate = if total_incidents > 0 {
            incidents_duplicate as f64 / total_incidents as f64
        } else {
            0.0
        };

        Ok(RunStatistics {
            total_runs,
            incidents_created,
            incidents_duplicate,
            clusters_found,
            avg_duration_seconds: avg_duration,
            duplicate_rate,
        })
    }
}
