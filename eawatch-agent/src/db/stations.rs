//! Station metadata lookups
//!
//! The stations table maps (source, station_id) to coordinates and is
//! populated by an out-of-band sync job; the pipeline only reads it. Fetchers
//! resolve a whole batch of station ids in one round-trip.

use std::collections::HashMap;

use sqlx::PgPool;

use eawatch_common::Result;

use crate::models::{Source, Station};

pub struct StationMetadataStore {
    db: PgPool,
}

impl StationMetadataStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Resolve a batch of station ids for one source in a single query.
    ///
    /// Missing stations simply have no entry in the returned map; callers
    /// keep the readings but mark them coordinate-less.
    pub async fn lookup_batch(
        &self,
        source: Source,
        station_ids: &[String],
    ) -> Result<HashMap<String, Station>> {
        if station_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(
            String,
            Option<f64>,
            Option<f64>,
            Option<i64>,
            Option<i64>,
            Option<String>,
        )> = sqlx::query_as(
            r#"
            SELECT station_id, lat, lon, easting, northing, label
            FROM stations
            WHERE source = $1 AND station_id = ANY($2)
            "#,
        )
        .bind(source.as_str())
        .bind(station_ids)
        .fetch_all(&self.db)
        .await?;

        let mut map = HashMap::with_capacity(rows.len());
        for (station_id, lat, lon, easting, northing, label) in rows {
            map.insert(
                station_id.clone(),
                Station {
                    source,
                    station_id,
                    lat,
                    lon,
                    easting,
                    northing,
                    label,
                },
            );
        }

        tracing::debug!(
            source = %source,
            requested = station_ids.len(),
            resolved = map.len(),
            "Station metadata batch lookup"
        );

        Ok(map)
    }
}
