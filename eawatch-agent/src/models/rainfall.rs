//! Rainfall correlation summaries

use serde::{Deserialize, Serialize};

/// Rainfall intensity category derived from the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RainfallCategory {
    Heavy,
    Moderate,
    Light,
    None,
}

impl RainfallCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RainfallCategory::Heavy => "heavy",
            RainfallCategory::Moderate => "moderate",
            RainfallCategory::Light => "light",
            RainfallCategory::None => "none",
        }
    }

    /// Phrase embedded in incident summaries.
    pub fn phrase(&self) -> &'static str {
        match self {
            RainfallCategory::Heavy => "Heavy rainfall recorded nearby",
            RainfallCategory::Moderate => "Moderate rainfall recorded nearby",
            RainfallCategory::Light => "Light rainfall recorded nearby",
            RainfallCategory::None => "No rainfall recorded nearby",
        }
    }
}

impl std::fmt::Display for RainfallCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated rainfall around a cluster centroid over the correlation window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RainfallSummary {
    /// Sum of gauge readings within radius and window, in millimetres
    pub total_mm: f64,
    /// Largest single gauge reading
    pub max_mm: f64,
    /// Number of distinct gauges contributing
    pub station_count: usize,
    pub category: RainfallCategory,
}

impl RainfallSummary {
    /// Summary for a centroid with no gauges in range.
    pub fn empty() -> Self {
        Self {
            total_mm: 0.0,
            max_mm: 0.0,
            station_count: 0,
            category: RainfallCategory::None,
        }
    }
}
