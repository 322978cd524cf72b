//! Station-similarity engine: pairwise cosine similarity of pollutant
//! time series pivoted by timestamp.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use ndarray::Array2;
use tracing::debug;

use crate::error::PipelineError;
use crate::features::FeatureTable;
use crate::observation::Pollutant;

/// Symmetric station-by-station similarity matrix, labeled by canonical
/// station name.
///
/// Recomputed wholesale whenever the underlying dataset changes; immutable
/// once built.
#[derive(Debug, Clone)]
pub struct SimilarityMatrix {
    stations: Vec<String>,
    matrix: Array2<f64>,
}

impl SimilarityMatrix {
    /// Builds the matrix from a feature table.
    ///
    /// The chosen pollutant is pivoted into a timestamp-by-station grid;
    /// duplicate cells aggregate by mean. Absent cells count as zero
    /// concentration for similarity purposes only; this is not a general
    /// imputation path.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SchemaMismatch`] if the table lacks the
    /// pollutant column.
    pub fn from_table(
        table: &FeatureTable,
        pollutant: Pollutant,
    ) -> Result<Self, PipelineError> {
        let column = pollutant.column_name();
        let col_idx = table.column_index(column).ok_or_else(|| {
            PipelineError::SchemaMismatch(format!("feature table has no '{column}' column"))
        })?;

        let mut stations: Vec<String> = table.rows.iter().map(|r| r.station.clone()).collect();
        stations.sort();
        stations.dedup();

        let mut timestamps: Vec<NaiveDateTime> =
            table.rows.iter().map(|r| r.timestamp).collect();
        timestamps.sort();
        timestamps.dedup();

        let station_pos: BTreeMap<&str, usize> = stations
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        let time_pos: BTreeMap<NaiveDateTime, usize> = timestamps
            .iter()
            .enumerate()
            .map(|(i, &t)| (t, i))
            .collect();

        let mut sums = Array2::<f64>::zeros((timestamps.len(), stations.len()));
        let mut counts = Array2::<f64>::zeros((timestamps.len(), stations.len()));
        for row in &table.rows {
            let t = time_pos[&row.timestamp];
            let s = station_pos[row.station.as_str()];
            sums[[t, s]] += row.values[col_idx];
            counts[[t, s]] += 1.0;
        }

        let mut pivot = Array2::<f64>::zeros((timestamps.len(), stations.len()));
        for t in 0..timestamps.len() {
            for s in 0..stations.len() {
                if counts[[t, s]] > 0.0 {
                    pivot[[t, s]] = sums[[t, s]] / counts[[t, s]];
                }
            }
        }

        let norms: Vec<f64> = (0..stations.len())
            .map(|s| pivot.column(s).dot(&pivot.column(s)).sqrt())
            .collect();

        let mut matrix = Array2::<f64>::zeros((stations.len(), stations.len()));
        for i in 0..stations.len() {
            for j in i..stations.len() {
                let value = if norms[i] == 0.0 || norms[j] == 0.0 {
                    0.0
                } else {
                    pivot.column(i).dot(&pivot.column(j)) / (norms[i] * norms[j])
                };
                matrix[[i, j]] = value;
                matrix[[j, i]] = value;
            }
        }

        debug!(
            stations = stations.len(),
            timestamps = timestamps.len(),
            pollutant = column,
            "Similarity matrix built"
        );

        Ok(Self { stations, matrix })
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    fn position(&self, station: &str) -> Option<usize> {
        self.stations.iter().position(|s| s == station)
    }

    /// Similarity between two stations, if both are present.
    pub fn score(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.position(a)?;
        let j = self.position(b)?;
        Some(self.matrix[[i, j]])
    }

    /// Other stations ranked by descending similarity to the target.
    ///
    /// Ties keep the matrix's station order. `None` when the target has no
    /// column in the matrix.
    pub fn neighbors(&self, target: &str) -> Option<Vec<(String, f64)>> {
        let t = self.position(target)?;
        let mut ranked: Vec<(String, f64)> = self
            .stations
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != t)
            .map(|(i, s)| (s.clone(), self.matrix[[t, i]]))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Some(ranked)
    }

    /// The single most similar other station, if any.
    pub fn top_neighbor(&self, target: &str) -> Option<(String, f64)> {
        self.neighbors(target)?.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureRow;
    use chrono::NaiveDate;

    fn table(rows: &[(&str, u32, f64)]) -> FeatureTable {
        FeatureTable {
            columns: vec!["pm25".to_string()],
            rows: rows
                .iter()
                .map(|(station, day, value)| FeatureRow {
                    timestamp: NaiveDate::from_ymd_opt(2021, 1, *day)
                        .unwrap()
                        .and_hms_opt(0, 0, 0)
                        .unwrap(),
                    station: station.to_string(),
                    category: "SEDANG".to_string(),
                    values: vec![*value],
                })
                .collect(),
        }
    }

    #[test]
    fn test_self_similarity_is_one_for_nonzero_stations() {
        let t = table(&[
            ("DKI1", 1, 10.0),
            ("DKI1", 2, 20.0),
            ("DKI2", 1, 5.0),
            ("DKI2", 2, 8.0),
        ]);
        let sim = SimilarityMatrix::from_table(&t, Pollutant::Pm25).unwrap();
        for s in sim.stations() {
            assert!((sim.score(s, s).unwrap() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_matrix_is_symmetric() {
        let t = table(&[
            ("DKI1", 1, 10.0),
            ("DKI1", 2, 20.0),
            ("DKI2", 1, 5.0),
            ("DKI2", 3, 8.0),
            ("DKI3", 2, 40.0),
        ]);
        let sim = SimilarityMatrix::from_table(&t, Pollutant::Pm25).unwrap();
        for a in sim.stations() {
            for b in sim.stations() {
                assert_eq!(sim.score(a, b), sim.score(b, a));
            }
        }
    }

    #[test]
    fn test_parallel_series_score_one() {
        // DKI2 is exactly twice DKI1 on every date: cosine 1.0
        let t = table(&[
            ("DKI1", 1, 10.0),
            ("DKI1", 2, 20.0),
            ("DKI2", 1, 20.0),
            ("DKI2", 2, 40.0),
        ]);
        let sim = SimilarityMatrix::from_table(&t, Pollutant::Pm25).unwrap();
        assert!((sim.score("DKI1", "DKI2").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_disjoint_dates_score_zero() {
        // no overlapping dates: zero-filled vectors are orthogonal
        let t = table(&[
            ("DKI1", 1, 10.0),
            ("DKI1", 2, 20.0),
            ("DKI2", 3, 5.0),
            ("DKI2", 4, 8.0),
        ]);
        let sim = SimilarityMatrix::from_table(&t, Pollutant::Pm25).unwrap();
        assert_eq!(sim.score("DKI1", "DKI2"), Some(0.0));
    }

    #[test]
    fn test_neighbors_exclude_target_and_rank_descending() {
        let t = table(&[
            ("DKI1", 1, 10.0),
            ("DKI1", 2, 20.0),
            ("DKI2", 1, 10.0),
            ("DKI2", 2, 20.0),
            ("DKI3", 1, 20.0),
            ("DKI3", 2, 10.0),
        ]);
        let sim = SimilarityMatrix::from_table(&t, Pollutant::Pm25).unwrap();
        let ranked = sim.neighbors("DKI1").unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, "DKI2");
        assert!(ranked[0].1 >= ranked[1].1);
    }

    #[test]
    fn test_absent_target_yields_none() {
        let t = table(&[("DKI1", 1, 10.0), ("DKI2", 1, 5.0)]);
        let sim = SimilarityMatrix::from_table(&t, Pollutant::Pm25).unwrap();
        assert!(sim.neighbors("DKI9").is_none());
        assert!(sim.top_neighbor("DKI9").is_none());
    }

    #[test]
    fn test_duplicate_cells_aggregate_by_mean() {
        let t = table(&[
            ("DKI1", 1, 10.0),
            ("DKI1", 1, 30.0),
            ("DKI2", 1, 20.0),
        ]);
        // DKI1's day-1 cell becomes 20.0, identical to DKI2's
        let sim = SimilarityMatrix::from_table(&t, Pollutant::Pm25).unwrap();
        assert!((sim.score("DKI1", "DKI2").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_pollutant_column_is_schema_mismatch() {
        let t = FeatureTable {
            columns: vec!["pm10".to_string()],
            rows: vec![],
        };
        let err = SimilarityMatrix::from_table(&t, Pollutant::Pm25).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
    }
}
