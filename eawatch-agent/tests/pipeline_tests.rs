//! End-to-end pipeline tests: detect → cluster → correlate → compose over
//! synthetic readings, without any network or database.

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use eawatch_agent::models::{
    Permit, PermitCategory, Priority, RainfallCategory, Reading, Source, SourceKind,
};
use eawatch_agent::services::incident_composer::content_hash;
use eawatch_agent::services::{
    AnomalyDetector, Clusterer, IncidentComposer, RainfallCorrelator, TemplateSummariser,
    ThresholdDetector,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
}

fn reading(
    id: &str,
    source: Source,
    parameter: &str,
    value: f64,
    lat: f64,
    lon: f64,
    minutes_ago: i64,
) -> Reading {
    Reading {
        station_id: id.to_string(),
        value,
        timestamp: now() - Duration::minutes(minutes_ago),
        parameter: parameter.to_string(),
        source,
        lat: Some(lat),
        lon: Some(lon),
        easting: Some(335000),
        northing: Some(125000),
    }
}

fn detector() -> ThresholdDetector {
    let mut thresholds = HashMap::new();
    thresholds.insert("flood:level".to_string(), 3.0);
    thresholds.insert("hydrology:flow".to_string(), 3.0);
    ThresholdDetector::new(thresholds)
}

fn clusterer() -> Clusterer {
    Clusterer::new(10.0, Duration::hours(24), 2)
}

fn correlator() -> RainfallCorrelator {
    RainfallCorrelator::new(10.0, Duration::hours(24), 15.0, 5.0)
}

fn composer() -> IncidentComposer {
    IncidentComposer::new(0.5, 0.2, Box::new(TemplateSummariser))
}

fn discharge_heavy_permits() -> Vec<Permit> {
    (0..10)
        .map(|k| Permit {
            permit_id: format!("EPR/{k:04}"),
            operator: format!("Operator {k}"),
            category: if k < 3 {
                PermitCategory::Discharge
            } else {
                PermitCategory::Other
            },
            type_label: None,
            site_address: None,
            site_postcode: None,
            lat: None,
            lon: None,
            distance_km: Some(0.3 + k as f64 / 10.0),
        })
        .collect()
}

/// Two flood anomalies 5–6 km apart within an hour, threshold 3.00, ten
/// permits (three discharge), zero rainfall: exactly one medium-priority
/// flood incident whose hash is stable across reruns.
#[test]
fn test_flood_cluster_to_incident() {
    let readings = vec![
        reading("531160", Source::Flood, "level", 3.97, 51.08, -2.87, 15),
        reading("52119", Source::Flood, "level", 3.74, 51.12, -2.82, 45),
        // Below threshold: never anomalous
        reading("99001", Source::Flood, "level", 2.10, 51.09, -2.85, 10),
    ];

    let anomalies = detector().classify(&readings);
    assert_eq!(anomalies.len(), 2);

    let clusters = clusterer().cluster(&anomalies);
    assert_eq!(clusters.len(), 1);
    let cluster = &clusters[0];
    assert_eq!(cluster.source_kind, SourceKind::Flood);
    assert_eq!(cluster.members.len(), 2);

    let rainfall = correlator().summarise(&[], (cluster.centroid_lat, cluster.centroid_lon), now());
    assert_eq!(rainfall.category, RainfallCategory::None);

    let incident = composer().compose(cluster, discharge_heavy_permits(), rainfall, "run-1");

    // 3.97 against 3.00 is a 32% exceedance
    assert_eq!(incident.priority, Priority::Medium);
    assert_eq!(incident.source_kind, SourceKind::Flood);
    assert!(incident.summary_text.contains("2 stations"));
    assert!(incident.summary_text.contains("3.97"));
    assert!(incident.summary_text.contains("No rainfall recorded nearby"));
    assert!(incident.summary_text.contains("10 permits nearby"));
    assert!(incident.summary_text.contains("3 discharge consents"));
    assert!(incident.summary_text.chars().count() <= 600);
    assert_eq!(incident.readings.len(), 2);
    assert_eq!(incident.permits.len(), 10);

    // Re-running the whole pipeline yields the same content hash
    let anomalies2 = detector().classify(&readings);
    let clusters2 = clusterer().cluster(&anomalies2);
    let rainfall2 =
        correlator().summarise(&[], (clusters2[0].centroid_lat, clusters2[0].centroid_lon), now());
    let incident2 = composer().compose(&clusters2[0], discharge_heavy_permits(), rainfall2, "run-2");
    assert_eq!(incident.content_hash, incident2.content_hash);
    assert_ne!(incident.incident_id, incident2.incident_id);
}

/// One flood and one hydrology anomaly 3 km apart, 30 minutes apart: one
/// mixed cluster with the mixed summary template.
#[test]
fn test_mixed_cluster() {
    let readings = vec![
        reading("531160", Source::Flood, "level", 3.60, 51.08, -2.87, 10),
        reading("E2043", Source::Hydrology, "flow", 3.80, 51.105, -2.86, 40),
    ];

    let anomalies = detector().classify(&readings);
    let clusters = clusterer().cluster(&anomalies);
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].source_kind, SourceKind::Mixed);

    let rainfall =
        correlator().summarise(&[], (clusters[0].centroid_lat, clusters[0].centroid_lon), now());
    let incident = composer().compose(&clusters[0], Vec::new(), rainfall, "run-1");

    assert_eq!(incident.source_kind, SourceKind::Mixed);
    assert!(incident
        .summary_text
        .starts_with("Combined flood and hydrology anomalies"));
}

/// Fifty anomalies in five regions at least 30 km apart: exactly five
/// clusters, one incident each.
#[test]
fn test_five_regions_five_incidents() {
    let mut readings = Vec::new();
    for (r, base_lat) in [50.5_f64, 50.9, 51.3, 51.7, 52.1].iter().enumerate() {
        for k in 0..10 {
            readings.push(reading(
                &format!("R{r}S{k}"),
                Source::Flood,
                "level",
                3.4 + (k as f64) * 0.02,
                base_lat + (k as f64) * 0.004,
                -2.85,
                (k as i64) * 7,
            ));
        }
    }

    let anomalies = detector().classify(&readings);
    assert_eq!(anomalies.len(), 50);

    let clusters = clusterer().cluster(&anomalies);
    assert_eq!(clusters.len(), 5);

    let incidents: Vec<_> = clusters
        .iter()
        .map(|c| {
            let rainfall = correlator().summarise(&[], (c.centroid_lat, c.centroid_lon), now());
            composer().compose(c, Vec::new(), rainfall, "run-1")
        })
        .collect();

    assert_eq!(incidents.len(), 5);
    let hashes: std::collections::HashSet<_> =
        incidents.iter().map(|i| i.content_hash.clone()).collect();
    assert_eq!(hashes.len(), 5, "each region hashes differently");
}

/// Zero readings from every fetcher is a valid cycle: no anomalies, no
/// clusters, no incidents.
#[test]
fn test_empty_cycle() {
    let anomalies = detector().classify(&[]);
    assert!(anomalies.is_empty());
    let clusters = clusterer().cluster(&anomalies);
    assert!(clusters.is_empty());
}

/// Rainfall near the cluster changes the summary commentary but never the
/// priority.
#[test]
fn test_rainfall_changes_commentary_not_priority() {
    let readings = vec![
        reading("A", Source::Flood, "level", 3.97, 51.08, -2.87, 15),
        reading("B", Source::Flood, "level", 3.74, 51.12, -2.82, 45),
    ];
    let anomalies = detector().classify(&readings);
    let clusters = clusterer().cluster(&anomalies);
    let cluster = &clusters[0];

    let gauges = vec![
        reading("G1", Source::Rainfall, "rainfall", 9.0, 51.09, -2.86, 60),
        reading("G2", Source::Rainfall, "rainfall", 8.5, 51.11, -2.84, 90),
    ];

    let dry = correlator().summarise(&[], (cluster.centroid_lat, cluster.centroid_lon), now());
    let wet = correlator().summarise(&gauges, (cluster.centroid_lat, cluster.centroid_lon), now());
    assert_eq!(dry.category, RainfallCategory::None);
    assert_eq!(wet.category, RainfallCategory::Heavy);

    let dry_incident = composer().compose(cluster, Vec::new(), dry, "run-1");
    let wet_incident = composer().compose(cluster, Vec::new(), wet, "run-1");

    assert_eq!(dry_incident.priority, wet_incident.priority);
    assert!(dry_incident.summary_text.contains("No rainfall recorded nearby"));
    assert!(wet_incident.summary_text.contains("Heavy rainfall recorded nearby"));
}

/// The content hash is a pure function of the anomaly tuple, priority and
/// source kind: permit and rainfall enrichment never affect it.
#[test]
fn test_content_hash_ignores_enrichment() {
    let readings = vec![
        reading("A", Source::Flood, "level", 3.97, 51.08, -2.87, 15),
        reading("B", Source::Flood, "level", 3.74, 51.12, -2.82, 45),
    ];
    let anomalies = detector().classify(&readings);
    let clusters = clusterer().cluster(&anomalies);
    let cluster = &clusters[0];

    let with_permits = composer().compose(
        cluster,
        discharge_heavy_permits(),
        correlator().summarise(&[], (cluster.centroid_lat, cluster.centroid_lon), now()),
        "run-1",
    );
    let without_permits = composer().compose(
        cluster,
        Vec::new(),
        correlator().summarise(&[], (cluster.centroid_lat, cluster.centroid_lon), now()),
        "run-1",
    );

    assert_eq!(with_permits.content_hash, without_permits.content_hash);
    assert_eq!(
        with_permits.content_hash,
        content_hash(cluster.source_kind, with_permits.priority, cluster)
    );
}
