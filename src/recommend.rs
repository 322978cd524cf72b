//! Fusion layer: combines the classifier probability, the station
//! similarity lookup, and raw-threshold policy rules into one
//! recommendation bundle.
//!
//! This is the single fusion implementation; the offline historical view
//! and any serving front end both call into it.

use serde::Serialize;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::features::{COL_DAY_OF_WEEK, FeatureRow};
use crate::model::ModelAssets;
use crate::observation::{IspuCategory, Pollutant};
use crate::similarity::SimilarityMatrix;

/// Primary message when the classifier predicts a safe/moderate day.
pub const SAFE_ACTION: &str =
    "Air quality is SAFE. Keep monitoring conditions, especially during rush hours.";

/// Primary message when the classifier predicts an unhealthy event.
pub const ALERT_ACTION: &str = "HIGH ALERT! Air quality is predicted UNHEALTHY. \
     Wear an N95 mask and restrict outdoor physical activity.";

/// Situational note when the target station has no similarity column.
pub const NO_CORRELATION_NOTE: &str = "No correlation warning available.";

/// Policy tier derived from today's literal measurement, independent of
/// the classifier's probabilistic forecast. The two are reported side by
/// side, never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PolicyTier {
    Emergency,
    Mitigation,
    Routine,
}

impl PolicyTier {
    pub fn label(self) -> &'static str {
        match self {
            PolicyTier::Emergency => "EMERGENCY",
            PolicyTier::Mitigation => "MITIGATION",
            PolicyTier::Routine => "ROUTINE",
        }
    }

    /// Guidance text for policy officials.
    pub fn guidance(self) -> &'static str {
        match self {
            PolicyTier::Emergency => {
                "EMERGENCY ACTION: apply work-from-home or heavy-vehicle restrictions \
                 in this zone for the next 24 hours. MEDIUM-TERM PLANNING: finalize \
                 electric-vehicle incentives and accelerate the clean-energy conversion \
                 of public transport."
            }
            PolicyTier::Mitigation => {
                "TIGHTEN EMISSION TESTING: run spot emission checks on roads and at the \
                 entry and exit points of nearby industrial estates. ZONING: review \
                 operating permits of adjacent industry and improve bus and commuter-rail \
                 capacity to cut private car use."
            }
            PolicyTier::Routine => {
                "SUSTAINED DEVELOPMENT: continue routine monitoring and invest in green \
                 projects such as low-emission zones and expanded urban green space at \
                 highly correlated locations."
            }
        }
    }
}

/// Output bundle for one scoring request.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub station: String,
    pub predicted_unhealthy: bool,
    pub predicted_label: String,
    /// Positive-class probability, fractional.
    pub probability: f64,
    pub primary_action: String,
    pub similarity_note: String,
    pub policy_tier: PolicyTier,
    pub policy_action: String,
}

/// Decision rule for the classifier probability: the boundary is inclusive
/// on the high side.
pub fn is_unhealthy(probability: f64, threshold: f64) -> bool {
    probability >= threshold
}

/// Three-tier policy rule over the raw, unscaled observation.
///
/// Evaluated in strict priority order: critical fine-particulate reading
/// first, then a high reading on a weekday, else routine. Both pollutant
/// thresholds are strict `>`; weekdays are day-of-week 0..=4.
pub fn policy_tier(pm25: f64, day_of_week: u32, cfg: &PipelineConfig) -> PolicyTier {
    let is_weekday = day_of_week < 5;
    if pm25 > cfg.pm25_critical {
        PolicyTier::Emergency
    } else if pm25 > cfg.pm25_high && is_weekday {
        PolicyTier::Mitigation
    } else {
        PolicyTier::Routine
    }
}

/// Maps a historical category label to the actual-condition (non-predictive)
/// recommendation string. Unrecognized labels fall back to a re-check
/// prompt rather than failing.
pub fn actual_recommendation(label: &str) -> &'static str {
    match IspuCategory::parse(label) {
        Some(IspuCategory::Good) => "Normal activity, air is safe",
        Some(IspuCategory::Moderate) => "Limit heavy outdoor activity",
        Some(IspuCategory::Unhealthy) => "Avoid outdoor activity, mask required",
        Some(IspuCategory::VeryUnhealthy) => "Very dangerous! Stay indoors",
        Some(IspuCategory::NoData) => "Data unavailable",
        None => "Re-check status",
    }
}

/// Produces the fused recommendation for one observed row.
///
/// A total function over a well-formed row and a consistent asset bundle:
/// a target station absent from the similarity matrix yields the fallback
/// note, never an error.
///
/// # Errors
///
/// Only [`PipelineError::SchemaMismatch`] from scoring, when the asset
/// bundle is inconsistent or the row shares no columns with it.
pub fn recommend(
    columns: &[String],
    row: &FeatureRow,
    target_station: &str,
    similarity: &SimilarityMatrix,
    assets: &ModelAssets,
    cfg: &PipelineConfig,
) -> Result<Recommendation, PipelineError> {
    let probability = assets.score(columns, &row.values)?;
    let predicted = is_unhealthy(probability, cfg.classifier_threshold);

    let similarity_note = match similarity.top_neighbor(target_station) {
        Some((station, score)) => format!(
            "Station with the closest pollution pattern: {station} (correlation {score:.2}). \
             Air quality tends to follow that location's pattern."
        ),
        None => NO_CORRELATION_NOTE.to_string(),
    };

    let pm25 = row
        .value_in(columns, Pollutant::Pm25.column_name())
        .unwrap_or(0.0);
    let day_of_week = row.value_in(columns, COL_DAY_OF_WEEK).unwrap_or(0.0) as u32;
    let tier = policy_tier(pm25, day_of_week, cfg);

    debug!(
        station = target_station,
        probability,
        predicted,
        tier = tier.label(),
        "Recommendation assembled"
    );

    Ok(Recommendation {
        station: target_station.to_string(),
        predicted_unhealthy: predicted,
        predicted_label: if predicted {
            IspuCategory::Unhealthy.label().to_string()
        } else {
            "AMAN/SEDANG".to_string()
        },
        probability,
        primary_action: if predicted {
            ALERT_ACTION.to_string()
        } else {
            SAFE_ACTION.to_string()
        },
        similarity_note,
        policy_tier: tier,
        policy_action: tier.guidance().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn test_threshold_boundary_inclusive_high_side() {
        assert!(is_unhealthy(0.70, 0.70));
        assert!(!is_unhealthy(0.6999999, 0.70));
        assert!(is_unhealthy(0.71, 0.70));
    }

    #[test]
    fn test_policy_tier_critical_boundary_is_strict() {
        let cfg = cfg();
        assert_eq!(policy_tier(100.0, 0, &cfg), PolicyTier::Mitigation);
        assert_eq!(policy_tier(100.01, 0, &cfg), PolicyTier::Emergency);
        // weekend: exactly 100 is not high-and-weekday either
        assert_eq!(policy_tier(100.0, 5, &cfg), PolicyTier::Routine);
    }

    #[test]
    fn test_policy_tier_high_boundary_is_strict() {
        let cfg = cfg();
        assert_eq!(policy_tier(70.0, 0, &cfg), PolicyTier::Routine);
        assert_eq!(policy_tier(70.01, 0, &cfg), PolicyTier::Mitigation);
    }

    #[test]
    fn test_policy_tier_weekday_condition() {
        let cfg = cfg();
        // Friday counts, Saturday does not
        assert_eq!(policy_tier(80.0, 4, &cfg), PolicyTier::Mitigation);
        assert_eq!(policy_tier(80.0, 5, &cfg), PolicyTier::Routine);
        assert_eq!(policy_tier(80.0, 6, &cfg), PolicyTier::Routine);
    }

    #[test]
    fn test_emergency_ignores_weekday() {
        let cfg = cfg();
        assert_eq!(policy_tier(150.0, 6, &cfg), PolicyTier::Emergency);
    }

    #[test]
    fn test_actual_recommendation_known_labels() {
        assert_eq!(
            actual_recommendation("TIDAK SEHAT"),
            "Avoid outdoor activity, mask required"
        );
        assert_eq!(actual_recommendation("BAIK"), "Normal activity, air is safe");
        assert_eq!(
            actual_recommendation("SANGAT TIDAK SEHAT"),
            "Very dangerous! Stay indoors"
        );
        assert_eq!(actual_recommendation("TIDAK ADA DATA"), "Data unavailable");
    }

    #[test]
    fn test_actual_recommendation_unknown_label_falls_back() {
        assert_eq!(actual_recommendation("KABUT"), "Re-check status");
        assert_eq!(actual_recommendation(""), "Re-check status");
    }
}
