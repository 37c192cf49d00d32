//! Pipeline services: upstream clients, detection, clustering, enrichment,
//! composition and the per-cycle orchestrator.

pub mod anomaly_detector;
pub mod clusterer;
pub mod cycle_orchestrator;
pub mod embedding_client;
pub mod flood_client;
pub mod geocode_client;
pub mod hydrology_client;
pub mod incident_composer;
pub mod permits_client;
pub mod rainfall_client;
pub mod rainfall_correlator;
pub mod summariser;

pub use anomaly_detector::{AnomalyDetector, ThresholdDetector};
pub use clusterer::Clusterer;
pub use cycle_orchestrator::CycleOrchestrator;
pub use embedding_client::EmbeddingClient;
pub use flood_client::FloodClient;
pub use geocode_client::GeocodeClient;
pub use hydrology_client::HydrologyClient;
pub use incident_composer::IncidentComposer;
pub use permits_client::PermitsClient;
pub use rainfall_client::RainfallClient;
pub use rainfall_correlator::RainfallCorrelator;
pub use summariser::{Summariser, TemplateSummariser};
