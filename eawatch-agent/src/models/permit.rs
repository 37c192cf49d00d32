//! Regulatory permits returned by the public-registers API

use serde::{Deserialize, Serialize};

/// Permit category derived from the register / registration-type labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermitCategory {
    Waste,
    Discharge,
    FloodRisk,
    Abstraction,
    Other,
}

impl PermitCategory {
    /// Static mapping from the registry's type labels.
    pub fn from_label(label: &str) -> PermitCategory {
        let lower = label.to_lowercase();
        if lower.contains("waste") {
            PermitCategory::Waste
        } else if lower.contains("discharge") {
            PermitCategory::Discharge
        } else if lower.contains("flood") {
            PermitCategory::FloodRisk
        } else if lower.contains("abstraction") {
            PermitCategory::Abstraction
        } else {
            PermitCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermitCategory::Waste => "waste",
            PermitCategory::Discharge => "discharge",
            PermitCategory::FloodRisk => "flood-risk",
            PermitCategory::Abstraction => "abstraction",
            PermitCategory::Other => "other",
        }
    }

    /// Short phrase used in incident summaries and suggested actions.
    pub fn phrase(&self) -> &'static str {
        match self {
            PermitCategory::Waste => "waste operations",
            PermitCategory::Discharge => "discharge consents",
            PermitCategory::FloodRisk => "flood risk activities",
            PermitCategory::Abstraction => "water abstraction",
            PermitCategory::Other => "permitted activities",
        }
    }
}

/// A regulatory permit near an incident centroid.
///
/// `distance_km` is the straight-line distance to the centroid of the
/// incident this permit is attached to, taken from the registry response or
/// computed after geocoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permit {
    pub permit_id: String,
    pub operator: String,
    pub category: PermitCategory,
    /// Raw registration-type label from the registry
    pub type_label: Option<String>,
    pub site_address: Option<String>,
    pub site_postcode: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub distance_km: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            PermitCategory::from_label("Waste exemptions register"),
            PermitCategory::Waste
        );
        assert_eq!(
            PermitCategory::from_label("Water discharge consent"),
            PermitCategory::Discharge
        );
        assert_eq!(
            PermitCategory::from_label("Flood risk activity exemption"),
            PermitCategory::FloodRisk
        );
        assert_eq!(
            PermitCategory::from_label("Water abstraction licence"),
            PermitCategory::Abstraction
        );
        assert_eq!(
            PermitCategory::from_label("Industrial installation"),
            PermitCategory::Other
        );
    }
}
