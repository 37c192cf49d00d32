//! Vector similarity index
//!
//! Incident summaries are embedded once per incident and stored in a
//! pgvector column keyed by incident id. The existence pre-check makes
//! `embed_and_store` a no-op for already-indexed incidents without spending
//! an embedding-service call; the primary-key conflict clause keeps a racing
//! second writer harmless.

use pgvector::Vector;
use sqlx::PgPool;
use uuid::Uuid;

use eawatch_common::Result;

use crate::models::Incident;
use crate::services::embedding_client::EmbeddingClient;

/// One nearest neighbour from a similarity query.
#[derive(Debug, Clone)]
pub struct Neighbour {
    pub incident_id: Uuid,
    /// Cosine similarity in [0, 1]
    pub score: f64,
}

/// Outcome of `embed_and_store`, reporting the embedding-service spend.
#[derive(Debug, Clone, Copy)]
pub struct EmbedOutcome {
    /// Whether a new embedding row was written
    pub embedded: bool,
    pub api_calls: usize,
}

pub struct SimilarityIndex {
    db: PgPool,
    client: EmbeddingClient,
}

impl SimilarityIndex {
    pub fn new(db: PgPool, client: EmbeddingClient) -> Self {
        Self { db, client }
    }

    /// Embed the incident's summary and store it, keyed by incident id.
    ///
    /// Idempotent: when an embedding for this incident already exists the
    /// call returns without contacting the embedding service.
    pub async fn embed_and_store(&self, incident: &Incident) -> Result<EmbedOutcome> {
        let exists: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM incident_embeddings WHERE id = $1")
                .bind(incident.incident_id)
                .fetch_optional(&self.db)
                .await?;

        if exists.is_some() {
            tracing::debug!(
                incident_id = %incident.incident_id,
                "Embedding already stored, skipping"
            );
            return Ok(EmbedOutcome {
                embedded: false,
                api_calls: 0,
            });
        }

        let embedded = self.client.embed(&incident.summary_text).await?;

        sqlx::query(
            r#"
            INSERT INTO incident_embeddings (id, run_id, summary, embedding)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(incident.incident_id)
        .bind(&incident.run_id)
        .bind(&incident.summary_text)
        .bind(Vector::from(embedded.vector))
        .execute(&self.db)
        .await?;

        tracing::debug!(incident_id = %incident.incident_id, "Embedding stored");

        Ok(EmbedOutcome {
            embedded: true,
            api_calls: embedded.api_calls,
        })
    }

    /// Up to `k` nearest neighbours of `text` with cosine similarity at
    /// least `min_score`, best first. Returns the neighbours plus the number
    /// of embedding-service calls spent on the query.
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        min_score: f64,
    ) -> Result<(Vec<Neighbour>, usize)> {
        let embedded = self.client.embed(text).await?;
        let vector = Vector::from(embedded.vector);

        let rows: Vec<(Uuid, f64)> = sqlx::query_as(
            r#"
            SELECT id, 1 - (embedding <=> $1) AS score
            FROM incident_embeddings
            ORDER BY embedding <=> $1
            LIMIT $2
            "#,
        )
        .bind(&vector)
        .bind(k as i64)
        .fetch_all(&self.db)
        .await?;

        let neighbours = rows
            .into_iter()
            .filter(|(_, score)| *score >= min_score)
            .map(|(incident_id, score)| Neighbour { incident_id, score })
            .collect();

        Ok((neighbours, embedded.api_calls))
    }
}
