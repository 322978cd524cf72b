//! Retrospective tracking view: the recommendations that would have been
//! issued for historical rows, for audit rather than prediction.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::features::{COL_DAY_OF_WEEK, FeatureTable, filter_by_date_range};
use crate::observation::{Pollutant, timestamp_format};
use crate::recommend::{actual_recommendation, policy_tier};

/// One historical tracking entry.
#[derive(Debug, Clone, Serialize)]
pub struct HistoricalRecord {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub station: String,
    pub category: String,
    pub pm25: f64,
    /// What the public should have been told, from the recorded category.
    pub actual_action: String,
    pub policy_tier: String,
    pub policy_action: String,
}

/// Builds the tracking log, newest first, for an optional inclusive date
/// range, truncated to `limit` entries.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyFilter`] when the range matches no rows.
pub fn build_history(
    table: &FeatureTable,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: usize,
    cfg: &PipelineConfig,
) -> Result<Vec<HistoricalRecord>, PipelineError> {
    let filtered = filter_by_date_range(table, from, to)?;

    let mut rows: Vec<&crate::features::FeatureRow> = filtered.rows.iter().collect();
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let records = rows
        .into_iter()
        .take(limit)
        .map(|row| {
            let pm25 = row
                .value_in(&filtered.columns, Pollutant::Pm25.column_name())
                .unwrap_or(0.0);
            let day_of_week = row.value_in(&filtered.columns, COL_DAY_OF_WEEK).unwrap_or(0.0) as u32;
            let tier = policy_tier(pm25, day_of_week, cfg);
            HistoricalRecord {
                timestamp: row.timestamp,
                station: row.station.clone(),
                category: row.category.clone(),
                pm25,
                actual_action: actual_recommendation(&row.category).to_string(),
                policy_tier: tier.label().to_string(),
                policy_action: tier.guidance().to_string(),
            }
        })
        .collect();

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureRow;
    use crate::recommend::PolicyTier;

    fn table() -> FeatureTable {
        let columns = vec![
            "pm25".to_string(),
            COL_DAY_OF_WEEK.to_string(),
        ];
        let rows = vec![
            ("DKI1", "2021-01-04", 120.0, 0.0, "TIDAK SEHAT"),
            ("DKI1", "2021-01-05", 30.0, 1.0, "BAIK"),
            ("DKI1", "2021-01-09", 80.0, 5.0, "SEDANG"),
        ]
        .into_iter()
        .map(|(station, date, pm25, dow, category)| FeatureRow {
            timestamp: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            station: station.to_string(),
            category: category.to_string(),
            values: vec![pm25, dow],
        })
        .collect();
        FeatureTable { columns, rows }
    }

    #[test]
    fn test_history_is_newest_first_and_limited() {
        let cfg = PipelineConfig::default();
        let records = build_history(&table(), None, None, 2, &cfg).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].timestamp > records[1].timestamp);
        assert_eq!(records[0].station, "DKI1");
    }

    #[test]
    fn test_history_records_combine_actual_and_policy() {
        let cfg = PipelineConfig::default();
        let records = build_history(&table(), None, None, 10, &cfg).unwrap();
        // newest first: Jan 9 (weekend, high) is routine
        assert_eq!(records[0].policy_tier, PolicyTier::Routine.label());
        // Jan 4: critical reading on a weekday
        let critical = records.iter().find(|r| r.pm25 > 100.0).unwrap();
        assert_eq!(critical.policy_tier, PolicyTier::Emergency.label());
        assert_eq!(critical.actual_action, "Avoid outdoor activity, mask required");
    }

    #[test]
    fn test_history_empty_range_is_empty_filter() {
        let cfg = PipelineConfig::default();
        let err = build_history(
            &table(),
            Some(NaiveDate::from_ymd_opt(1999, 1, 1).unwrap()),
            Some(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()),
            10,
            &cfg,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyFilter(_)));
    }
}
