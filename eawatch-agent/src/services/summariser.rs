//! Incident summarisation
//!
//! The summariser is a capability: the pipeline depends only on the trait,
//! and the shipped implementation renders deterministic templated text from
//! the cluster and its enrichments. An LLM-backed implementation could slot
//! in behind the same trait.

use crate::models::{
    Cluster, Permit, PermitCategory, Priority, RainfallCategory, RainfallSummary, SourceKind,
};

/// Maximum length of a summary paragraph, in characters.
const MAX_SUMMARY_CHARS: usize = 600;

/// How many station ids a summary names before eliding the rest.
const MAX_STATIONS_NAMED: usize = 6;

/// Everything the summariser may draw on.
pub struct SummaryInput<'a> {
    pub cluster: &'a Cluster,
    pub permits: &'a [Permit],
    pub rainfall: &'a RainfallSummary,
    pub priority: Priority,
}

impl SummaryInput<'_> {
    fn category_count(&self, category: PermitCategory) -> usize {
        self.permits
            .iter()
            .filter(|p| p.category == category)
            .count()
    }

    fn lead_stations(&self) -> String {
        let ids = self.cluster.station_ids();
        ids.iter()
            .take(2)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Rendered summary: one paragraph of text plus an ordered action list.
pub struct Summary {
    pub text: String,
    pub suggested_actions: Vec<String>,
}

/// Turns a cluster and its enrichments into summary text and actions.
pub trait Summariser: Send + Sync {
    fn summarise(&self, input: &SummaryInput<'_>) -> Summary;
}

/// Deterministic template summariser. The template is selected by the
/// cluster's source kind; suggested actions come from a static rule table
/// evaluated in declared order.
pub struct TemplateSummariser;

impl Summariser for TemplateSummariser {
    fn summarise(&self, input: &SummaryInput<'_>) -> Summary {
        let text = truncate_chars(render_summary(input), MAX_SUMMARY_CHARS);
        let suggested_actions = ACTION_RULES
            .iter()
            .filter(|rule| (rule.applies)(input))
            .map(|rule| (rule.render)(input))
            .collect();

        Summary {
            text,
            suggested_actions,
        }
    }
}

fn render_summary(input: &SummaryInput<'_>) -> String {
    let cluster = input.cluster;
    let ids = cluster.station_ids();
    let station_count = ids.len();
    let shown: Vec<&str> = ids
        .iter()
        .take(MAX_STATIONS_NAMED)
        .map(String::as_str)
        .collect();
    let mut station_list = shown.join(", ");
    if ids.len() > MAX_STATIONS_NAMED {
        station_list.push('…');
    }

    let peak = cluster.peak();
    let peak_value = peak.reading.value;
    let avg_value = cluster.mean_value();
    let threshold = peak.threshold;

    let opening = match cluster.source_kind {
        SourceKind::Flood => format!(
            "Elevated river levels at {} stations ({}). Peak {:.2} m, average {:.2} m against threshold {:.2} m.",
            station_count,
            station_list,
            peak_value,
            avg_value,
            threshold,
        ),
        SourceKind::Hydrology => format!(
            "Anomalous hydrology readings at {} stations ({}). Peak {:.2}, average {:.2} against threshold {:.2}.",
            station_count,
            station_list,
            peak_value,
            avg_value,
            threshold,
        ),
        SourceKind::Mixed => format!(
            "Combined flood and hydrology anomalies at {} stations ({}). Peak {:.2}, average {:.2} against threshold {:.2}.",
            station_count,
            station_list,
            peak_value,
            avg_value,
            threshold,
        ),
    };

    format!(
        "{} {} {}",
        opening,
        rainfall_phrase(input.rainfall),
        permit_phrase(input.permits),
    )
}

fn rainfall_phrase(rainfall: &RainfallSummary) -> String {
    match rainfall.category {
        RainfallCategory::None => format!("{}.", rainfall.category.phrase()),
        _ => format!(
            "{} ({:.1} mm across {} gauges).",
            rainfall.category.phrase(),
            rainfall.total_mm,
            rainfall.station_count,
        ),
    }
}

fn permit_phrase(permits: &[Permit]) -> String {
    if permits.is_empty() {
        return "No permits identified nearby.".to_string();
    }

    // Interesting categories in a fixed order; "other" is never called out.
    let callouts: Vec<String> = [
        PermitCategory::Waste,
        PermitCategory::Discharge,
        PermitCategory::FloodRisk,
        PermitCategory::Abstraction,
    ]
    .iter()
    .filter_map(|&category| {
        let count = permits.iter().filter(|p| p.category == category).count();
        (count > 0).then(|| format!("{count} {}", category.phrase()))
    })
    .collect();

    if callouts.is_empty() {
        format!("{} permits nearby.", permits.len())
    } else {
        format!("{} permits nearby ({}).", permits.len(), callouts.join(", "))
    }
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    text.chars().take(max_chars - 1).chain(std::iter::once('…')).collect()
}

// ---------------------------------------------------------------------------
// Suggested-action rules
// ---------------------------------------------------------------------------

/// One row of the action table. All rules whose precondition matches fire,
/// in the order declared below.
struct ActionRule {
    applies: fn(&SummaryInput<'_>) -> bool,
    render: fn(&SummaryInput<'_>) -> String,
}

const ACTION_RULES: &[ActionRule] = &[
    // Monitoring, by source kind
    ActionRule {
        applies: |i| i.cluster.source_kind == SourceKind::Flood,
        render: |i| format!("Monitor river levels at {}", i.lead_stations()),
    },
    ActionRule {
        applies: |i| i.cluster.source_kind == SourceKind::Hydrology,
        render: |i| format!("Monitor groundwater and flow at {}", i.lead_stations()),
    },
    ActionRule {
        applies: |i| i.cluster.source_kind == SourceKind::Mixed,
        render: |i| {
            format!(
                "Monitor combined river level and flow readings at {}",
                i.lead_stations()
            )
        },
    },
    // Investigation, by priority
    ActionRule {
        applies: |i| i.cluster.source_kind != SourceKind::Hydrology && i.priority == Priority::High,
        render: |i| {
            let peak = i.cluster.peak();
            format!(
                "Assess flood risk: peak {:.2} well above threshold {:.2}",
                peak.reading.value, peak.threshold
            )
        },
    },
    ActionRule {
        applies: |i| i.cluster.source_kind == SourceKind::Flood && i.priority != Priority::High,
        render: |_| "Investigate cause of elevated water levels".to_string(),
    },
    ActionRule {
        applies: |i| i.cluster.source_kind != SourceKind::Flood,
        render: |i| {
            format!(
                "Investigate anomaly: peak reading {:.2}",
                i.cluster.peak().reading.value
            )
        },
    },
    // Permit follow-ups
    ActionRule {
        applies: |i| {
            i.cluster.source_kind != SourceKind::Hydrology
                && i.category_count(PermitCategory::FloodRisk) > 0
        },
        render: |i| {
            format!(
                "Review {} flood risk activity permits in the area",
                i.category_count(PermitCategory::FloodRisk)
            )
        },
    },
    ActionRule {
        applies: |i| {
            i.cluster.source_kind != SourceKind::Flood
                && i.category_count(PermitCategory::Waste) > 0
        },
        render: |i| {
            format!(
                "Check {} waste permits for contamination risk",
                i.category_count(PermitCategory::Waste)
            )
        },
    },
    ActionRule {
        applies: |i| i.category_count(PermitCategory::Discharge) > 0,
        render: |i| {
            format!(
                "Review {} discharge consents for compliance",
                i.category_count(PermitCategory::Discharge)
            )
        },
    },
    ActionRule {
        applies: |i| {
            i.cluster.source_kind == SourceKind::Flood
                && !i.permits.is_empty()
                && i.category_count(PermitCategory::FloodRisk) == 0
        },
        render: |i| {
            format!(
                "Check whether {} nearby permitted activities affect flow",
                i.permits.len()
            )
        },
    },
    ActionRule {
        applies: |i| i.permits.is_empty(),
        render: |_| "Survey for non-permitted sources in the area".to_string(),
    },
    // Rainfall context
    ActionRule {
        applies: |i| {
            matches!(
                i.rainfall.category,
                RainfallCategory::Heavy | RainfallCategory::Moderate
            )
        },
        render: |i| {
            format!(
                "Correlate readings with rainfall ({:.1} mm over the window)",
                i.rainfall.total_mm
            )
        },
    },
    ActionRule {
        applies: |i| i.rainfall.category == RainfallCategory::None,
        render: |_| "No rainfall recorded; prioritise non-weather causes".to_string(),
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Anomaly, Reading, Source};
    use chrono::{TimeZone, Utc};

    fn anomaly(id: &str, source: Source, value: f64, threshold: f64) -> Anomaly {
        Anomaly {
            reading: Reading {
                station_id: id.to_string(),
                value,
                timestamp: Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap(),
                parameter: "level".to_string(),
                source,
                lat: Some(51.1),
                lon: Some(-2.85),
                easting: Some(335000),
                northing: Some(125000),
            },
            threshold,
            classification: "threshold_exceeded".to_string(),
        }
    }

    fn cluster(members: Vec<Anomaly>) -> Cluster {
        let window_start = members.iter().map(|m| m.reading.timestamp).min().unwrap();
        let window_end = members.iter().map(|m| m.reading.timestamp).max().unwrap();
        Cluster {
            source_kind: SourceKind::of_members(&members),
            members,
            centroid_lat: 51.1,
            centroid_lon: -2.85,
            window_start,
            window_end,
        }
    }

    fn permit(category: PermitCategory) -> Permit {
        Permit {
            permit_id: "EPR/XX".to_string(),
            operator: "Op".to_string(),
            category,
            type_label: None,
            site_address: None,
            site_postcode: None,
            lat: None,
            lon: None,
            distance_km: Some(0.5),
        }
    }

    #[test]
    fn test_flood_summary_mentions_key_facts() {
        let cluster = cluster(vec![
            anomaly("531160", Source::Flood, 3.97, 3.0),
            anomaly("52119", Source::Flood, 3.74, 3.0),
        ]);
        let permits: Vec<Permit> = (0..10)
            .map(|k| {
                permit(if k < 3 {
                    PermitCategory::Discharge
                } else {
                    PermitCategory::Other
                })
            })
            .collect();
        let rainfall = RainfallSummary::empty();
        let input = SummaryInput {
            cluster: &cluster,
            permits: &permits,
            rainfall: &rainfall,
            priority: Priority::Medium,
        };

        let summary = TemplateSummariser.summarise(&input);
        assert!(summary.text.contains("2 stations"));
        assert!(summary.text.contains("3.97"));
        assert!(summary.text.contains("threshold 3.00"));
        assert!(summary.text.contains("No rainfall recorded nearby"));
        assert!(summary.text.contains("10 permits nearby"));
        assert!(summary.text.contains("3 discharge consents"));
        assert!(summary.text.chars().count() <= 600);
    }

    #[test]
    fn test_station_count_is_distinct_stations() {
        // Two readings from the same station count as one station
        let cluster = cluster(vec![
            anomaly("531160", Source::Flood, 3.97, 3.0),
            anomaly("531160", Source::Flood, 3.80, 3.0),
        ]);
        let rainfall = RainfallSummary::empty();
        let input = SummaryInput {
            cluster: &cluster,
            permits: &[],
            rainfall: &rainfall,
            priority: Priority::Medium,
        };
        let summary = TemplateSummariser.summarise(&input);
        assert!(summary.text.contains("1 stations (531160)"));
    }

    #[test]
    fn test_station_list_truncated_to_six() {
        let members: Vec<Anomaly> = (0..8)
            .map(|k| anomaly(&format!("S{k}"), Source::Flood, 3.5, 3.0))
            .collect();
        let cluster = cluster(members);
        let rainfall = RainfallSummary::empty();
        let input = SummaryInput {
            cluster: &cluster,
            permits: &[],
            rainfall: &rainfall,
            priority: Priority::Low,
        };
        let summary = TemplateSummariser.summarise(&input);
        assert!(summary.text.contains('…'));
        assert!(!summary.text.contains("S7"));
    }

    #[test]
    fn test_mixed_template_selected() {
        let cluster = cluster(vec![
            anomaly("A", Source::Flood, 3.5, 3.0),
            anomaly("B", Source::Hydrology, 60.0, 50.0),
        ]);
        let rainfall = RainfallSummary::empty();
        let input = SummaryInput {
            cluster: &cluster,
            permits: &[],
            rainfall: &rainfall,
            priority: Priority::Low,
        };
        let summary = TemplateSummariser.summarise(&input);
        assert!(summary.text.starts_with("Combined flood and hydrology anomalies"));
    }

    #[test]
    fn test_actions_follow_table_order() {
        let cluster = cluster(vec![
            anomaly("A", Source::Flood, 3.97, 3.0),
            anomaly("B", Source::Flood, 3.74, 3.0),
        ]);
        let permits = vec![permit(PermitCategory::Discharge)];
        let rainfall = RainfallSummary::empty();
        let input = SummaryInput {
            cluster: &cluster,
            permits: &permits,
            rainfall: &rainfall,
            priority: Priority::Medium,
        };

        let summary = TemplateSummariser.summarise(&input);
        let actions = &summary.suggested_actions;
        assert_eq!(actions[0], "Monitor river levels at A, B");
        assert_eq!(actions[1], "Investigate cause of elevated water levels");
        assert_eq!(actions[2], "Review 1 discharge consents for compliance");
        assert_eq!(
            actions[3],
            "Check whether 1 nearby permitted activities affect flow"
        );
        assert_eq!(
            actions[4],
            "No rainfall recorded; prioritise non-weather causes"
        );
        assert_eq!(actions.len(), 5);
    }

    #[test]
    fn test_high_priority_flood_assessment_action() {
        let cluster = cluster(vec![
            anomaly("A", Source::Flood, 5.0, 3.0),
            anomaly("B", Source::Flood, 4.8, 3.0),
        ]);
        let rainfall = RainfallSummary::empty();
        let input = SummaryInput {
            cluster: &cluster,
            permits: &[],
            rainfall: &rainfall,
            priority: Priority::High,
        };
        let summary = TemplateSummariser.summarise(&input);
        assert!(summary
            .suggested_actions
            .iter()
            .any(|a| a.starts_with("Assess flood risk")));
    }

    #[test]
    fn test_summarise_is_deterministic() {
        let cluster = cluster(vec![
            anomaly("A", Source::Flood, 3.97, 3.0),
            anomaly("B", Source::Flood, 3.74, 3.0),
        ]);
        let rainfall = RainfallSummary::empty();
        let input = SummaryInput {
            cluster: &cluster,
            permits: &[],
            rainfall: &rainfall,
            priority: Priority::Medium,
        };
        let a = TemplateSummariser.summarise(&input);
        let b = TemplateSummariser.summarise(&input);
        assert_eq!(a.text, b.text);
        assert_eq!(a.suggested_actions, b.suggested_actions);
    }
}
