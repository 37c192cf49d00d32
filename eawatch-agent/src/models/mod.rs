//! Domain model types for the eawatch agent
//!
//! These are the records flowing between pipeline stages. Conversions from
//! upstream payloads happen at the client boundary; everything downstream of
//! the fetchers works with these types only.

mod cluster;
mod incident;
mod permit;
mod rainfall;
mod reading;
mod run_log;

pub use cluster::{Cluster, SourceKind};
pub use incident::{Incident, Priority};
pub use permit::{Permit, PermitCategory};
pub use rainfall::{RainfallCategory, RainfallSummary};
pub use reading::{Anomaly, Reading, Source, Station};
pub use run_log::{
    AgentRunLog, ApiCallCounts, ClusterDetail, ReadingCounts, SimilaritySearchResult, StageError,
    StoreCounts,
};
