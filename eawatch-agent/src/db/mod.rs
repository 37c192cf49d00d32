//! Postgres access for the eawatch agent
//!
//! One pool serves the document store (incidents + run logs as JSONB), the
//! station metadata table and the pgvector-backed embeddings table. The pool
//! lives for the process lifetime; handles are borrowed per cycle.

pub mod embeddings;
pub mod incidents;
pub mod run_logs;
pub mod stations;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use eawatch_common::Result;

pub use embeddings::SimilarityIndex;
pub use incidents::IncidentStore;
pub use run_logs::RunLogRecorder;
pub use stations::StationMetadataStore;

/// Connect to Postgres and create tables that don't exist yet.
pub async fn init_database_pool(database_url: &str, embedding_dim: usize) -> Result<PgPool> {
    tracing::debug!("Connecting to Postgres");

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;

    init_tables(&pool, embedding_dim).await?;

    Ok(pool)
}

/// Create the agent's tables and indexes if they don't exist.
async fn init_tables(pool: &PgPool, embedding_dim: usize) -> Result<()> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stations (
            source TEXT NOT NULL,
            station_id TEXT NOT NULL,
            lat DOUBLE PRECISION,
            lon DOUBLE PRECISION,
            easting BIGINT,
            northing BIGINT,
            label TEXT,
            last_seen TIMESTAMPTZ,
            PRIMARY KEY (source, station_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS incidents (
            id UUID PRIMARY KEY,
            content_hash TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            priority TEXT NOT NULL,
            source_kind TEXT NOT NULL,
            run_id TEXT NOT NULL,
            doc JSONB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS incidents_content_hash_idx ON incidents (content_hash)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS incidents_created_at_idx ON incidents (created_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agent_run_logs (
            run_id TEXT PRIMARY KEY,
            started_at TIMESTAMPTZ NOT NULL,
            doc JSONB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS agent_run_logs_started_at_idx ON agent_run_logs (started_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS incident_embeddings (
            id UUID PRIMARY KEY,
            run_id TEXT NOT NULL,
            summary TEXT NOT NULL,
            embedding vector({embedding_dim}) NOT NULL
        )
        "#,
    ))
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (stations, incidents, agent_run_logs, incident_embeddings)");

    Ok(())
}
