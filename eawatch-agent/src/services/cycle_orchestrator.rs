//! Cycle orchestration
//!
//! Drives one detection cycle end-to-end:
//! FETCH → DETECT → CLUSTER → ENRICH → COMPOSE → PERSIST → LOG.
//!
//! No stage error terminates the cycle; every failure is recorded in the run
//! log and the cycle continues with whatever data it has. Cancellation (from
//! the deadline watchdog or process shutdown) is cooperative: in-flight work
//! is abandoned and a partial run log is written with the abort cause.

use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use eawatch_common::Result;

use crate::config::AgentConfig;
use crate::db::{IncidentStore, RunLogRecorder, SimilarityIndex, StationMetadataStore};
use crate::graph::GraphIngestor;
use crate::models::{
    AgentRunLog, Cluster, ClusterDetail, Incident, Permit, RainfallSummary, Reading,
    SimilaritySearchResult,
};

use super::anomaly_detector::{AnomalyDetector, ThresholdDetector};
use super::clusterer::Clusterer;
use super::embedding_client::EmbeddingClient;
use super::flood_client::FloodClient;
use super::geocode_client::GeocodeClient;
use super::hydrology_client::HydrologyClient;
use super::incident_composer::IncidentComposer;
use super::permits_client::PermitsClient;
use super::rainfall_client::RainfallClient;
use super::rainfall_correlator::RainfallCorrelator;
use super::summariser::TemplateSummariser;

/// One cluster plus its enrichments, ready for composition.
struct EnrichedCluster {
    cluster: Cluster,
    permits: Vec<Permit>,
    rainfall: RainfallSummary,
    permit_error: Option<String>,
    permit_api_calls: usize,
    geocode_calls: usize,
}

pub struct CycleOrchestrator {
    config: AgentConfig,
    stations: StationMetadataStore,
    flood: FloodClient,
    hydrology: HydrologyClient,
    rainfall: RainfallClient,
    permits: PermitsClient,
    detector: Box<dyn AnomalyDetector>,
    clusterer: Clusterer,
    correlator: RainfallCorrelator,
    composer: IncidentComposer,
    incidents: IncidentStore,
    similarity: SimilarityIndex,
    graph: GraphIngestor,
    run_logs: RunLogRecorder,
}

impl CycleOrchestrator {
    /// Wire up the full pipeline from configuration and the shared pools.
    pub fn new(config: AgentConfig, db: PgPool, graph: GraphIngestor) -> Result<Self> {
        let stations = StationMetadataStore::new(db.clone());
        let flood = FloodClient::new(config.flood.clone())?;
        let hydrology = HydrologyClient::new(config.hydrology.clone())?;
        let rainfall = RainfallClient::new(config.rainfall.clone())?;
        let geocode = GeocodeClient::new(config.geocode.clone())?;
        let permits = PermitsClient::new(config.permits.clone(), geocode)?;
        let embedding = EmbeddingClient::new(config.embedding.clone(), config.embedding_dim)?;

        let detector: Box<dyn AnomalyDetector> = Box::new(ThresholdDetector::from_config(&config));
        let clusterer = Clusterer::from_config(&config);
        let correlator = RainfallCorrelator::from_config(&config);
        let composer = IncidentComposer::from_config(&config, Box::new(TemplateSummariser));

        let incidents = IncidentStore::from_config(db.clone(), &config);
        let similarity = SimilarityIndex::new(db.clone(), embedding);
        let run_logs = RunLogRecorder::new(db);

        Ok(Self {
            config,
            stations,
            flood,
            hydrology,
            rainfall,
            permits,
            detector,
            clusterer,
            correlator,
            composer,
            incidents,
            similarity,
            graph,
            run_logs,
        })
    }

    /// Run one cycle to completion (or cooperative abort) and persist the
    /// run log. Never returns an error: every failure ends up in the log.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> AgentRunLog {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();
        let mut log = AgentRunLog::new(run_id.clone(), started_at);

        tracing::info!(run_id = %run_id, "Starting detection cycle");

        // Deadline watchdog: cancels the cycle token, which also trips when
        // the process is shutting down.
        let cycle_cancel = shutdown.child_token();
        let watchdog = {
            let token = cycle_cancel.clone();
            let deadline = Duration::from_secs(self.config.cycle_deadline_seconds);
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                tracing::warn!("Cycle deadline exceeded, cancelling");
                token.cancel();
            })
        };

        // A panic anywhere in the pipeline is caught here so the run log
        // still gets written and the scheduler keeps ticking.
        let outcome = std::panic::AssertUnwindSafe(self.execute(&cycle_cancel, &mut log))
            .catch_unwind()
            .await;
        watchdog.abort();

        if let Err(panic) = outcome {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log.record_error("cycle", format!("panic: {message}"));
        }

        if log.aborted.is_some() {
            let cause = if shutdown.is_cancelled() {
                "shutdown signal"
            } else {
                "deadline exceeded"
            };
            log.aborted = log.aborted.take().map(|stage| format!("{stage} ({cause})"));
        }

        log.duration_seconds = start.elapsed().as_secs_f64();
        self.run_logs.record(&log).await;

        tracing::info!(
            run_id = %run_id,
            duration_seconds = log.duration_seconds,
            incidents_created = log.incidents_created,
            incidents_duplicate = log.incidents_duplicate,
            errors = log.errors.len(),
            aborted = log.aborted.as_deref().unwrap_or("no"),
            "Detection cycle finished"
        );

        log
    }

    /// The cycle body. Fills in the run log as it goes; returns early (with
    /// `log.aborted` set) when the cycle token trips.
    async fn execute(&self, cancel: &CancellationToken, log: &mut AgentRunLog) {
        let run_id = log.run_id.clone();

        // FETCH: all three upstreams concurrently
        let fetches = tokio::join!(
            guarded(cancel, self.flood.fetch_latest(&self.stations)),
            guarded(cancel, self.hydrology.fetch_latest(&self.stations)),
            guarded(cancel, self.rainfall.fetch_latest(&self.stations)),
        );
        let (flood_fetch, hydrology_fetch, rainfall_fetch) = fetches;
        if cancel.is_cancelled() {
            log.aborted = Some("cancelled during fetch".to_string());
            return;
        }

        // A failed fetcher degrades to zero readings plus a stage error; the
        // cycle continues with whatever the other sources produced.
        let mut detect_input: Vec<Reading> = Vec::new();
        let mut rainfall_readings: Vec<Reading> = Vec::new();

        match flood_fetch {
            Some(Ok(result)) => {
                log.readings_fetched.flood = result.readings.len();
                log.api_calls.flood = result.api_calls;
                detect_input.extend(result.readings);
            }
            Some(Err(e)) => log.record_error("flood_fetch", e.to_string()),
            None => {}
        }

        match hydrology_fetch {
            Some(Ok(result)) => {
                log.readings_fetched.hydrology = result.readings.len();
                log.api_calls.hydrology = result.api_calls;
                detect_input.extend(result.readings);
            }
            Some(Err(e)) => log.record_error("hydrology_fetch", e.to_string()),
            None => {}
        }

        match rainfall_fetch {
            Some(Ok(result)) => {
                log.readings_fetched.rainfall = result.readings.len();
                log.api_calls.rainfall = result.api_calls;
                rainfall_readings = result.readings;
            }
            Some(Err(e)) => log.record_error("rainfall_fetch", e.to_string()),
            None => {}
        }

        log.stations_fetched = detect_input
            .iter()
            .chain(rainfall_readings.iter())
            .map(|r| (r.source, r.station_id.clone()))
            .collect::<HashSet<_>>()
            .len();

        // DETECT: rainfall readings bypass detection
        let anomalies = self.detector.classify(&detect_input);

        // CLUSTER
        let clusters = self.clusterer.cluster(&anomalies);
        log.clusters_found = clusters.len();
        for cluster in &clusters {
            log.cluster_details.push(ClusterDetail {
                source_kind: cluster.source_kind,
                station_count: cluster.station_ids().len(),
                center_lat: cluster.centroid_lat,
                center_lon: cluster.centroid_lon,
            });
        }

        if cancel.is_cancelled() {
            log.aborted = Some("cancelled during clustering".to_string());
            return;
        }

        // ENRICH: permits + rainfall per cluster, bounded fan-out across
        // clusters to protect the permits API
        let now = Utc::now();
        let rainfall_slice = rainfall_readings.as_slice();
        let permit_radius = self.config.permit_search_radius_km;

        let enrich = stream::iter(clusters.into_iter().map(move |cluster| async move {
            let rainfall = self.correlator.summarise(
                rainfall_slice,
                (cluster.centroid_lat, cluster.centroid_lon),
                now,
            );

            let mut permits = Vec::new();
            let mut permit_error = None;
            let mut permit_api_calls = 0;
            let mut geocode_calls = 0;
            match grid_anchor(&cluster) {
                Some((easting, northing)) => {
                    match self
                        .permits
                        .search_near(
                            (cluster.centroid_lat, cluster.centroid_lon),
                            easting,
                            northing,
                            permit_radius,
                        )
                        .await
                    {
                        Ok(search) => {
                            permits = search.permits;
                            permit_api_calls = search.api_calls;
                            geocode_calls = search.geocode_calls;
                        }
                        Err(e) => permit_error = Some(e.to_string()),
                    }
                }
                None => {
                    tracing::debug!("Cluster has no grid reference, skipping permit search");
                }
            }

            EnrichedCluster {
                cluster,
                permits,
                rainfall,
                permit_error,
                permit_api_calls,
                geocode_calls,
            }
        }))
        .buffer_unordered(self.config.max_cluster_fanout)
        .collect::<Vec<EnrichedCluster>>();

        let Some(enriched) = guarded(cancel, enrich).await else {
            log.aborted = Some("cancelled during enrichment".to_string());
            return;
        };

        for item in &enriched {
            log.api_calls.permits += item.permit_api_calls;
            log.api_calls.geocode += item.geocode_calls;
            if let Some(message) = &item.permit_error {
                log.record_error("permit_search", message.clone());
            }
        }

        // COMPOSE
        let incidents: Vec<Incident> = enriched
            .into_iter()
            .map(|e| {
                self.composer
                    .compose(&e.cluster, e.permits, e.rainfall, &run_id)
            })
            .collect();

        // PERSIST: dedup-gated document write, then vector and graph writes
        // fan out per stored incident
        for incident in incidents {
            let Some(store_result) = guarded(cancel, self.incidents.store_if_new(&incident)).await
            else {
                log.aborted = Some("cancelled during persistence".to_string());
                return;
            };

            let outcome = match store_result {
                Ok(outcome) => outcome,
                Err(e) => {
                    log.record_error("incident_store", e.to_string());
                    continue;
                }
            };

            if !outcome.stored {
                log.incidents_duplicate += 1;
                log.incident_ids_duplicate.push(outcome.effective_id);
                continue;
            }

            log.incidents_created += 1;
            log.incident_ids_created.push(incident.incident_id);
            log.stores.documents += 1;

            let Some((embed_result, graph_result)) = guarded(
                cancel,
                async {
                    tokio::join!(
                        self.similarity.embed_and_store(&incident),
                        self.graph.ingest(&incident),
                    )
                },
            )
            .await
            else {
                log.aborted = Some("cancelled during persistence".to_string());
                return;
            };

            match embed_result {
                Ok(embed) => {
                    log.api_calls.embedding += embed.api_calls;
                    if embed.embedded {
                        log.stores.embeddings += 1;
                    }
                }
                Err(e) => log.record_error("embedding", e.to_string()),
            }
            match graph_result {
                Ok(()) => log.stores.graph += 1,
                Err(e) => log.record_error("graph", e.to_string()),
            }

            self.enrich_with_similar(cancel, &incident, log).await;
            if log.aborted.is_some() {
                return;
            }
        }
    }

    /// Query the vector index for neighbours of a freshly stored incident,
    /// record the search in the run log and mirror the links into the graph.
    async fn enrich_with_similar(
        &self,
        cancel: &CancellationToken,
        incident: &Incident,
        log: &mut AgentRunLog,
    ) {
        // The incident's own embedding is already indexed and matches its
        // summary with similarity ~1.0, so ask for one extra neighbour and
        // drop self below to still hand back a full top-k.
        let query = self.similarity.query(
            &incident.summary_text,
            self.config.similarity_top_k + 1,
            self.config.similarity_min_score,
        );
        let Some(result) = guarded(cancel, query).await else {
            log.aborted = Some("cancelled during persistence".to_string());
            return;
        };

        match result {
            Ok((neighbours, api_calls)) => {
                log.api_calls.embedding += api_calls;
                log.similarity_searches += 1;

                let mut others: Vec<_> = neighbours
                    .into_iter()
                    .filter(|n| n.incident_id != incident.incident_id)
                    .collect();
                others.truncate(self.config.similarity_top_k);

                let best = others.iter().map(|n| n.score).fold(0.0, f64::max);
                let avg = if others.is_empty() {
                    0.0
                } else {
                    others.iter().map(|n| n.score).sum::<f64>() / others.len() as f64
                };

                log.similarity_results.push(SimilaritySearchResult {
                    incident_id: incident.incident_id,
                    neighbours_found: others.len(),
                    avg_similarity: avg,
                    best_similarity: best,
                    neighbour_ids: others.iter().map(|n| n.incident_id).collect(),
                });

                if !others.is_empty() {
                    if let Err(e) = self.graph.link_similar(incident.incident_id, &others).await {
                        log.record_error("graph_similarity", e.to_string());
                    }
                }
            }
            Err(e) => log.record_error("similarity_search", e.to_string()),
        }
    }
}

/// First member with a national-grid reference anchors the permit search.
fn grid_anchor(cluster: &Cluster) -> Option<(i64, i64)> {
    cluster.members.iter().find_map(|m| {
        match (m.reading.easting, m.reading.northing) {
            (Some(e), Some(n)) => Some((e, n)),
            _ => None,
        }
    })
}

/// Race a future against the cycle's cancellation token. `None` means the
/// token tripped first and the work was abandoned.
async fn guarded<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        value = fut => Some(value),
    }
}
