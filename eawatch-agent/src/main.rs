//! eawatch-agent - Environmental Incident Detection Agent
//!
//! Periodically fetches river level, flow and rainfall telemetry from the
//! public monitoring APIs, detects and clusters anomalous readings, enriches
//! each cluster with permit and rainfall context, and persists the resulting
//! incidents into the document, vector and graph stores.

use std::time::Duration;

use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eawatch_agent::config::AgentConfig;
use eawatch_agent::db;
use eawatch_agent::graph::GraphIngestor;
use eawatch_agent::services::CycleOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting eawatch-agent");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1);
    let config = AgentConfig::load(config_path.as_deref())?;
    info!(
        interval_seconds = config.schedule_interval_seconds,
        deadline_seconds = config.cycle_deadline_seconds,
        "Configuration loaded"
    );

    let pool = db::init_database_pool(&config.database_url, config.embedding_dim).await?;
    info!("Database connection established");

    let graph = GraphIngestor::connect(&config.neo4j).await?;
    graph.init_schema().await?;
    info!("Graph store connected");

    let interval_seconds = config.schedule_interval_seconds;
    let orchestrator = CycleOrchestrator::new(config, pool, graph)?;

    // Process-level shutdown: cancel the current cycle cooperatively, write
    // its partial run log, then exit.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    // Cycles never overlap: a long cycle delays the next tick, and missed
    // ticks are not queued.
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let log = orchestrator.run_cycle(&shutdown).await;
                info!(
                    run_id = %log.run_id,
                    incidents_created = log.incidents_created,
                    incidents_duplicate = log.incidents_duplicate,
                    "Cycle complete"
                );
                if shutdown.is_cancelled() {
                    break;
                }
            }
        }
    }

    info!("eawatch-agent stopped");
    Ok(())
}
