//! Property-graph store
//!
//! Writes the relationship view of each incident into Neo4j: incident,
//! station and permit nodes with MEASURED_AT / NEAR_PERMIT edges, plus
//! SIMILAR_TO edges from similarity enrichment. Everything is MERGE-based:
//! replaying an ingest leaves the graph unchanged, and existing nodes are
//! never overwritten.

use std::collections::HashMap;

use chrono::SecondsFormat;
use neo4rs::{query, Graph};

use eawatch_common::Result;

use crate::config::Neo4jConfig;
use crate::db::embeddings::Neighbour;
use crate::models::Incident;

pub struct GraphIngestor {
    graph: Graph,
}

/// Node and relationship counts by label/type.
#[derive(Debug, Default)]
pub struct GraphStats {
    pub nodes: HashMap<String, i64>,
    pub relationships: HashMap<String, i64>,
}

impl GraphIngestor {
    pub async fn connect(config: &Neo4jConfig) -> Result<Self> {
        let graph = Graph::new(&config.uri, &config.user, &config.password).await?;
        Ok(Self { graph })
    }

    /// Create uniqueness constraints. Run once at startup.
    pub async fn init_schema(&self) -> Result<()> {
        self.graph
            .run(query(
                "CREATE CONSTRAINT incident_id_unique IF NOT EXISTS \
                 FOR (i:Incident) REQUIRE i.incident_id IS UNIQUE",
            ))
            .await?;
        self.graph
            .run(query(
                "CREATE CONSTRAINT station_identity_unique IF NOT EXISTS \
                 FOR (s:Station) REQUIRE (s.source, s.station_id) IS UNIQUE",
            ))
            .await?;
        self.graph
            .run(query(
                "CREATE CONSTRAINT permit_id_unique IF NOT EXISTS \
                 FOR (p:Permit) REQUIRE p.permit_id IS UNIQUE",
            ))
            .await?;

        tracing::info!("Graph schema initialized (uniqueness constraints)");
        Ok(())
    }

    /// Write the incident subgraph. Idempotent by incident id, station
    /// identity and permit id.
    pub async fn ingest(&self, incident: &Incident) -> Result<()> {
        let incident_id = incident.incident_id.to_string();

        self.graph
            .run(
                query(
                    "MERGE (i:Incident {incident_id: $incident_id})
                     ON CREATE SET
                         i.created_at = datetime($created_at),
                         i.priority = $priority,
                         i.source_kind = $source_kind,
                         i.summary = $summary,
                         i.content_hash = $content_hash,
                         i.run_id = $run_id,
                         i.location = point({latitude: $lat, longitude: $lon})",
                )
                .param("incident_id", incident_id.as_str())
                .param(
                    "created_at",
                    incident
                        .created_at
                        .to_rfc3339_opts(SecondsFormat::Secs, true),
                )
                .param("priority", incident.priority.as_str())
                .param("source_kind", incident.source_kind.as_str())
                .param("summary", incident.summary_text.as_str())
                .param("content_hash", incident.content_hash.as_str())
                .param("run_id", incident.run_id.as_str())
                .param("lat", incident.centroid_lat)
                .param("lon", incident.centroid_lon),
            )
            .await?;

        // One MEASURED_AT edge per distinct station with coordinates
        let mut seen_stations = std::collections::HashSet::new();
        for reading in &incident.readings {
            let (Some(lat), Some(lon)) = (reading.lat, reading.lon) else {
                continue;
            };
            let key = (reading.source.as_str(), reading.station_id.clone());
            if !seen_stations.insert(key) {
                continue;
            }

            self.graph
                .run(
                    query(
                        "MERGE (s:Station {source: $source, station_id: $station_id})
                         ON CREATE SET
                             s.lat = $lat,
                             s.lon = $lon,
                             s.location = point({latitude: $lat, longitude: $lon})
                         WITH s
                         MATCH (i:Incident {incident_id: $incident_id})
                         MERGE (i)-[:MEASURED_AT]->(s)",
                    )
                    .param("source", reading.source.as_str())
                    .param("station_id", reading.station_id.as_str())
                    .param("lat", lat)
                    .param("lon", lon)
                    .param("incident_id", incident_id.as_str()),
                )
                .await?;
        }

        for permit in &incident.permits {
            self.graph
                .run(
                    query(
                        "MERGE (p:Permit {permit_id: $permit_id})
                         ON CREATE SET
                             p.operator = $operator,
                             p.category = $category,
                             p.type_label = $type_label,
                             p.address = $address,
                             p.postcode = $postcode
                         WITH p
                         MATCH (i:Incident {incident_id: $incident_id})
                         MERGE (i)-[r:NEAR_PERMIT]->(p)
                         ON CREATE SET r.distance_km = $distance_km",
                    )
                    .param("permit_id", permit.permit_id.as_str())
                    .param("operator", permit.operator.as_str())
                    .param("category", permit.category.as_str())
                    .param(
                        "type_label",
                        permit.type_label.clone().unwrap_or_default(),
                    )
                    .param(
                        "address",
                        permit.site_address.clone().unwrap_or_default(),
                    )
                    .param(
                        "postcode",
                        permit.site_postcode.clone().unwrap_or_default(),
                    )
                    .param("incident_id", incident_id.as_str())
                    .param("distance_km", permit.distance_km.unwrap_or(-1.0)),
                )
                .await?;
        }

        tracing::debug!(
            incident_id = %incident.incident_id,
            stations = seen_stations.len(),
            permits = incident.permits.len(),
            "Incident subgraph merged"
        );

        Ok(())
    }

    /// Link an incident to similar incidents found by the vector index.
    pub async fn link_similar(
        &self,
        incident_id: uuid::Uuid,
        neighbours: &[Neighbour],
    ) -> Result<()> {
        let incident_id = incident_id.to_string();
        for neighbour in neighbours {
            self.graph
                .run(
                    query(
                        "MATCH (a:Incident {incident_id: $a})
                         MATCH (b:Incident {incident_id: $b})
                         MERGE (a)-[r:SIMILAR_TO]->(b)
                         ON CREATE SET r.score = $score",
                    )
                    .param("a", incident_id.as_str())
                    .param("b", neighbour.incident_id.to_string())
                    .param("score", neighbour.score),
                )
                .await?;
        }
        Ok(())
    }

    /// Node and relationship counts, for the dashboard.
    pub async fn stats(&self) -> Result<GraphStats> {
        let mut stats = GraphStats::default();

        let mut stream = self
            .graph
            .execute(query(
                "MATCH (n) RETURN labels(n)[0] AS label, count(*) AS count",
            ))
            .await?;
        while let Some(row) = stream.next().await? {
            let label: String = row.get("label").unwrap_or_default();
            let count: i64 = row.get("count").unwrap_or(0);
            stats.nodes.insert(label, count);
        }

        let mut stream = self
            .graph
            .execute(query(
                "MATCH ()-[r]->() RETURN type(r) AS type, count(*) AS count",
            ))
            .await?;
        while let Some(row) = stream.next().await? {
            let rel_type: String = row.get("type").unwrap_or_default();
            let count: i64 = row.get("count").unwrap_or(0);
            stats.relationships.insert(rel_type, count);
        }

        Ok(stats)
    }
}
