//! Feature engineering over the normalized observation set.
//!
//! Builds the engineered feature table the classifier trains on: imputed
//! and outlier-capped pollutant columns, calendar features, per-station
//! lag and rolling means, and one-hot station/category indicators.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::observation::{Observation, Pollutant};

pub const COL_HOUR: &str = "jam";
pub const COL_DAY_OF_WEEK: &str = "hari_dalam_minggu";
pub const COL_MONTH: &str = "nomor_bulan";
pub const COL_SEASON: &str = "musim";
pub const STATION_PREFIX: &str = "stasiun_";
pub const CATEGORY_PREFIX: &str = "kategori_";

/// One engineered row: identifying fields kept out of the numeric matrix,
/// plus values aligned with [`FeatureTable::columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub timestamp: NaiveDateTime,
    pub station: String,
    /// Raw category label, trimmed; one-hot columns and the training label
    /// are derived from it.
    pub category: String,
    pub values: Vec<f64>,
}

impl FeatureRow {
    /// Looks up a value by column name against a caller-supplied column
    /// list (for rows detached from their table).
    pub fn value_in(&self, columns: &[String], name: &str) -> Option<f64> {
        columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i).copied())
    }
}

/// Engineered feature table with its authoritative column order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: &FeatureRow, name: &str) -> Option<f64> {
        self.column_index(name).map(|i| row.values[i])
    }

    /// The ordered model-input column list: every engineered column except
    /// the category indicators, which encode the label itself.
    pub fn model_feature_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.starts_with(CATEGORY_PREFIX))
            .cloned()
            .collect()
    }
}

/// Outcome of a feature-engineering run.
#[derive(Debug)]
pub struct FeatureReport {
    pub table: FeatureTable,
    /// Lag/rolling cells imputed with their column mean.
    pub lag_roll_imputed: usize,
    /// Rows dropped because a crucial column stayed missing after
    /// imputation.
    pub rows_dropped: usize,
}

/// Engineers the feature table from a normalized observation set.
///
/// The input must already be canonicalized, deduplicated, and sorted by
/// (station, date, hour); lag and rolling values are computed strictly
/// within each station's own sequence.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyFilter`] for an empty input set.
pub fn engineer_features(
    observations: &[Observation],
    cfg: &PipelineConfig,
) -> Result<FeatureReport, PipelineError> {
    if observations.is_empty() {
        return Err(PipelineError::EmptyFilter(
            "no observations to engineer".to_string(),
        ));
    }

    let n = observations.len();
    let window = cfg.rolling_window.max(1);

    // Contiguous index runs per station, in the sorted input order.
    let mut station_indices: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, obs) in observations.iter().enumerate() {
        station_indices
            .entry(obs.station.clone())
            .or_default()
            .push(i);
    }

    let mut pollutant_values: Vec<Vec<Option<f64>>> = Vec::with_capacity(Pollutant::ALL.len());
    for p in Pollutant::ALL {
        let mut values: Vec<Option<f64>> = observations.iter().map(|o| o.pollutant(p)).collect();

        // 1. Forward-fill inside each station's chronological sequence.
        for indices in station_indices.values() {
            let mut last: Option<f64> = None;
            for &i in indices {
                match values[i] {
                    Some(v) => last = Some(v),
                    None => values[i] = last,
                }
            }
        }

        // 2. Remaining gaps take the dataset-wide mean.
        if let Some(mean) = mean_of(&values) {
            for v in values.iter_mut() {
                if v.is_none() {
                    *v = Some(mean);
                }
            }
        }

        // 3. Clip the extreme upper tail at the configured quantile.
        if let Some(cap) = quantile_of(&values, cfg.outlier_quantile) {
            for v in values.iter_mut() {
                if let Some(x) = v {
                    if *x > cap {
                        *x = cap;
                    }
                }
            }
        }

        pollutant_values.push(values);
    }

    // Lag-1 and trailing rolling means, per station only.
    let mut lag_values: Vec<Vec<Option<f64>>> = Vec::with_capacity(Pollutant::ALL.len());
    let mut roll_values: Vec<Vec<Option<f64>>> = Vec::with_capacity(Pollutant::ALL.len());
    for values in &pollutant_values {
        let mut lag: Vec<Option<f64>> = vec![None; n];
        let mut roll: Vec<Option<f64>> = vec![None; n];
        for indices in station_indices.values() {
            for (k, &i) in indices.iter().enumerate() {
                if k > 0 {
                    lag[i] = values[indices[k - 1]];
                }
                let start = k.saturating_sub(window - 1);
                let tail: Vec<f64> = indices[start..=k]
                    .iter()
                    .filter_map(|&j| values[j])
                    .collect();
                if !tail.is_empty() {
                    roll[i] = Some(tail.iter().sum::<f64>() / tail.len() as f64);
                }
            }
        }
        lag_values.push(lag);
        roll_values.push(roll);
    }

    // Post-hoc imputation: early-sequence gaps in lag/roll columns take the
    // column's global mean.
    let mut lag_roll_imputed = 0usize;
    for column in lag_values.iter_mut().chain(roll_values.iter_mut()) {
        if let Some(mean) = mean_of(column) {
            for v in column.iter_mut() {
                if v.is_none() {
                    *v = Some(mean);
                    lag_roll_imputed += 1;
                }
            }
        }
    }

    let stations: Vec<String> = station_indices.keys().cloned().collect();
    let categories: BTreeSet<String> = observations
        .iter()
        .map(|o| o.category.trim().to_string())
        .collect();
    let categories: Vec<String> = categories.into_iter().collect();

    let mut columns: Vec<String> = Pollutant::ALL
        .iter()
        .map(|p| p.column_name().to_string())
        .collect();
    columns.extend(
        [COL_HOUR, COL_DAY_OF_WEEK, COL_MONTH, COL_SEASON]
            .iter()
            .map(|c| c.to_string()),
    );
    for p in Pollutant::ALL {
        columns.push(format!("{}_lag1", p.column_name()));
        columns.push(format!("{}_roll{}", p.column_name(), window));
    }
    columns.extend(stations.iter().map(|s| format!("{STATION_PREFIX}{s}")));
    columns.extend(categories.iter().map(|c| format!("{CATEGORY_PREFIX}{c}")));

    let mut rows: Vec<FeatureRow> = Vec::with_capacity(n);
    let mut rows_dropped = 0usize;
    'rows: for (i, obs) in observations.iter().enumerate() {
        let mut values: Vec<f64> = Vec::with_capacity(columns.len());

        for p_idx in 0..Pollutant::ALL.len() {
            match pollutant_values[p_idx][i] {
                Some(v) => values.push(v),
                None => {
                    rows_dropped += 1;
                    continue 'rows;
                }
            }
        }

        values.push(obs.timestamp.hour() as f64);
        values.push(obs.timestamp.weekday().num_days_from_monday() as f64);
        values.push(obs.timestamp.month() as f64);
        values.push(season_index(obs.timestamp.month()) as f64);

        for p_idx in 0..Pollutant::ALL.len() {
            match (lag_values[p_idx][i], roll_values[p_idx][i]) {
                (Some(lag), Some(roll)) => {
                    values.push(lag);
                    values.push(roll);
                }
                _ => {
                    rows_dropped += 1;
                    continue 'rows;
                }
            }
        }

        for station in &stations {
            values.push(if obs.station == *station { 1.0 } else { 0.0 });
        }
        let label = obs.category.trim();
        for category in &categories {
            values.push(if label == category { 1.0 } else { 0.0 });
        }

        rows.push(FeatureRow {
            timestamp: obs.timestamp,
            station: obs.station.clone(),
            category: label.to_string(),
            values,
        });
    }

    info!(
        rows = rows.len(),
        columns = columns.len(),
        lag_roll_imputed,
        rows_dropped,
        "Feature engineering complete"
    );

    Ok(FeatureReport {
        table: FeatureTable { columns, rows },
        lag_roll_imputed,
        rows_dropped,
    })
}

/// Season index for a month, 1..=4: Dec-Feb wet onset, Mar-May transition,
/// Jun-Aug dry, Sep-Nov transition.
pub fn season_index(month: u32) -> u32 {
    (month % 12 + 3) / 3
}

/// Restricts a feature table to rows within an inclusive date range.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyFilter`] when the range matches nothing.
pub fn filter_by_date_range(
    table: &FeatureTable,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<FeatureTable, PipelineError> {
    let rows: Vec<FeatureRow> = table
        .rows
        .iter()
        .filter(|r| {
            let date = r.timestamp.date();
            from.map_or(true, |f| date >= f) && to.map_or(true, |t| date <= t)
        })
        .cloned()
        .collect();

    if rows.is_empty() {
        return Err(PipelineError::EmptyFilter(format!(
            "no rows between {:?} and {:?}",
            from, to
        )));
    }

    debug!(rows = rows.len(), "Date filter applied");
    Ok(FeatureTable {
        columns: table.columns.clone(),
        rows,
    })
}

fn mean_of(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

/// Quantile with linear interpolation between order statistics.
fn quantile_of(values: &[Option<f64>], q: f64) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let position = q.clamp(0.0, 1.0) * (present.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return Some(present[lower]);
    }
    let fraction = position - lower as f64;
    Some(present[lower] + fraction * (present[upper] - present[lower]))
}
