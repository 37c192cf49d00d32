//! Spatial clustering of anomalies
//!
//! Greedy single-linkage clustering on great-circle distance, restricted to
//! anomalies inside the temporal window ending at the latest timestamp in
//! the input. Every member of a cluster is within `spatial_radius_km` of the
//! cluster's seed, which bounds any pairwise distance by twice the radius.

use chrono::Duration;

use eawatch_common::geo;

use crate::config::AgentConfig;
use crate::models::{Anomaly, Cluster, SourceKind};

pub struct Clusterer {
    spatial_radius_km: f64,
    temporal_window: Duration,
    min_cluster_size: usize,
}

impl Clusterer {
    pub fn new(spatial_radius_km: f64, temporal_window: Duration, min_cluster_size: usize) -> Self {
        Self {
            spatial_radius_km,
            temporal_window,
            min_cluster_size,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            config.spatial_radius_km,
            Duration::hours(config.temporal_window_hours),
            config.min_cluster_size,
        )
    }

    /// Group anomalies into clusters.
    ///
    /// Anomalies are visited in input order: each unassigned anomaly seeds a
    /// new candidate cluster and absorbs every later-unassigned anomaly
    /// within `spatial_radius_km` of the seed (inclusive bound). Candidates
    /// below `min_cluster_size` are discarded, and their members stay
    /// unassigned for later seeds.
    pub fn cluster(&self, anomalies: &[Anomaly]) -> Vec<Cluster> {
        let located: Vec<&Anomaly> = anomalies
            .iter()
            .filter(|a| a.reading.has_coordinates())
            .collect();

        // Temporal window anchored at the latest reading in the batch, which
        // keeps the result deterministic with respect to the input.
        let Some(latest) = located.iter().map(|a| a.reading.timestamp).max() else {
            return Vec::new();
        };
        let cutoff = latest - self.temporal_window;
        let recent: Vec<&Anomaly> = located
            .into_iter()
            .filter(|a| a.reading.timestamp >= cutoff)
            .collect();

        let mut assigned = vec![false; recent.len()];
        let mut clusters = Vec::new();

        for i in 0..recent.len() {
            if assigned[i] {
                continue;
            }
            let seed = recent[i];
            let seed_lat = seed.reading.lat.unwrap();
            let seed_lon = seed.reading.lon.unwrap();

            let mut member_indices = vec![i];
            for (j, other) in recent.iter().enumerate() {
                if j == i || assigned[j] {
                    continue;
                }
                let d = geo::haversine_km(
                    seed_lat,
                    seed_lon,
                    other.reading.lat.unwrap(),
                    other.reading.lon.unwrap(),
                );
                if d <= self.spatial_radius_km {
                    member_indices.push(j);
                }
            }

            if member_indices.len() < self.min_cluster_size {
                continue;
            }

            for &j in &member_indices {
                assigned[j] = true;
            }

            let members: Vec<Anomaly> = member_indices
                .iter()
                .map(|&j| recent[j].clone())
                .collect();

            let points: Vec<(f64, f64)> = members
                .iter()
                .map(|m| (m.reading.lat.unwrap(), m.reading.lon.unwrap()))
                .collect();
            let (centroid_lat, centroid_lon) =
                geo::centroid(&points).expect("clusters are non-empty");

            let window_start = members
                .iter()
                .map(|m| m.reading.timestamp)
                .min()
                .expect("clusters are non-empty");
            let window_end = members
                .iter()
                .map(|m| m.reading.timestamp)
                .max()
                .expect("clusters are non-empty");

            clusters.push(Cluster {
                source_kind: SourceKind::of_members(&members),
                members,
                centroid_lat,
                centroid_lon,
                window_start,
                window_end,
            });
        }

        tracing::debug!(
            anomalies = anomalies.len(),
            clusters = clusters.len(),
            "Spatial clustering complete"
        );

        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Reading, Source};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, hour, minute, 0).unwrap()
    }

    fn anomaly(id: &str, source: Source, lat: f64, lon: f64, value: f64, at: DateTime<Utc>) -> Anomaly {
        Anomaly {
            reading: Reading {
                station_id: id.to_string(),
                value,
                timestamp: at,
                parameter: "level".to_string(),
                source,
                lat: Some(lat),
                lon: Some(lon),
                easting: Some(335000),
                northing: Some(125000),
            },
            threshold: 3.0,
            classification: "threshold_exceeded".to_string(),
        }
    }

    fn clusterer(radius_km: f64) -> Clusterer {
        Clusterer::new(radius_km, Duration::hours(24), 2)
    }

    #[test]
    fn test_two_nearby_anomalies_form_one_cluster() {
        // ≈ 5.6 km apart
        let anomalies = vec![
            anomaly("A", Source::Flood, 51.08, -2.87, 3.97, ts(12, 0)),
            anomaly("B", Source::Flood, 51.12, -2.82, 3.74, ts(11, 30)),
        ];
        let clusters = clusterer(10.0).cluster(&anomalies);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 2);
        assert_eq!(clusters[0].source_kind, SourceKind::Flood);
        assert!((clusters[0].centroid_lat - 51.10).abs() < 1e-9);
        assert_eq!(clusters[0].window_start, ts(11, 30));
        assert_eq!(clusters[0].window_end, ts(12, 0));
    }

    #[test]
    fn test_radius_bound_is_inclusive() {
        let a = anomaly("A", Source::Flood, 51.00, -2.80, 3.5, ts(12, 0));
        let b = anomaly("B", Source::Flood, 51.09, -2.80, 3.5, ts(12, 0));
        let d = eawatch_common::geo::haversine_km(51.00, -2.80, 51.09, -2.80);

        // Exactly the separation distance: still one cluster
        let clusters = clusterer(d).cluster(&[a.clone(), b.clone()]);
        assert_eq!(clusters.len(), 1);

        // Just under: no cluster survives the minimum size
        let clusters = clusterer(d - 0.001).cluster(&[a, b]);
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_single_anomaly_below_min_size() {
        let anomalies = vec![anomaly("A", Source::Flood, 51.0, -2.8, 4.0, ts(12, 0))];
        assert!(clusterer(10.0).cluster(&anomalies).is_empty());
    }

    #[test]
    fn test_temporal_window_anchored_at_latest() {
        let anomalies = vec![
            anomaly("A", Source::Flood, 51.08, -2.87, 3.9, ts(12, 0)),
            anomaly("B", Source::Flood, 51.09, -2.86, 3.8, ts(11, 0)),
            // 30 hours before the latest reading: outside the window
            anomaly(
                "C",
                Source::Flood,
                51.10,
                -2.85,
                3.7,
                Utc.with_ymd_and_hms(2026, 6, 30, 6, 0, 0).unwrap(),
            ),
        ];
        let clusters = clusterer(10.0).cluster(&anomalies);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 2);
        assert!(clusters[0]
            .members
            .iter()
            .all(|m| m.reading.station_id != "C"));
    }

    #[test]
    fn test_mixed_source_kind() {
        let anomalies = vec![
            anomaly("A", Source::Flood, 51.08, -2.87, 3.9, ts(12, 0)),
            anomaly("B", Source::Hydrology, 51.10, -2.85, 60.0, ts(11, 30)),
        ];
        let clusters = clusterer(10.0).cluster(&anomalies);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].source_kind, SourceKind::Mixed);
    }

    #[test]
    fn test_five_distant_regions_make_five_clusters() {
        // Five regions spaced ≥ 30 km apart, ten anomalies each
        let mut anomalies = Vec::new();
        for (r, base_lat) in [50.5, 50.9, 51.3, 51.7, 52.1].iter().enumerate() {
            for k in 0..10 {
                anomalies.push(anomaly(
                    &format!("R{r}S{k}"),
                    Source::Flood,
                    base_lat + (k as f64) * 0.005,
                    -2.8,
                    3.5 + k as f64 * 0.01,
                    ts(10, k),
                ));
            }
        }
        let clusters = clusterer(10.0).cluster(&anomalies);
        assert_eq!(clusters.len(), 5);
        assert!(clusters.iter().all(|c| c.members.len() == 10));
    }

    #[test]
    fn test_clusters_are_disjoint_and_pairwise_bounded() {
        let mut anomalies = Vec::new();
        for k in 0..20 {
            anomalies.push(anomaly(
                &format!("S{k}"),
                Source::Flood,
                51.0 + (k as f64) * 0.03,
                -2.8 + (k as f64 % 3.0) * 0.05,
                3.2 + k as f64 * 0.05,
                ts(9, k),
            ));
        }
        let radius = 10.0;
        let clusters = clusterer(radius).cluster(&anomalies);

        let mut seen = std::collections::HashSet::new();
        for cluster in &clusters {
            for member in &cluster.members {
                assert!(
                    seen.insert(member.reading.station_id.clone()),
                    "anomaly in more than one cluster"
                );
            }
            for a in &cluster.members {
                for b in &cluster.members {
                    let d = eawatch_common::geo::haversine_km(
                        a.reading.lat.unwrap(),
                        a.reading.lon.unwrap(),
                        b.reading.lat.unwrap(),
                        b.reading.lon.unwrap(),
                    );
                    assert!(d <= 2.0 * radius + 1e-9);
                }
            }
        }
    }
}
