//! Output formatting and persistence for pipeline artifacts.
//!
//! Supports pretty-printing, JSON serialization, CSV append, and the
//! engineered feature table's CSV round trip.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::features::{FeatureRow, FeatureTable};
use crate::observation::timestamp_format;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

const META_COLUMNS: [&str; 3] = ["tanggal_lengkap", "stasiun", "kategori"];

/// Logs a record using Rust's debug pretty-print format.
pub fn print_pretty<T: std::fmt::Debug>(record: &T) {
    debug!("{:#?}", record);
}

/// Prints a record as pretty-printed JSON on stdout.
pub fn print_json<T: Serialize>(record: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

/// Appends a serializable record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record<T: Serialize>(path: &str, record: &T) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Writes the engineered feature table to CSV: the three identifying
/// columns first, then the engineered columns in table order.
pub fn write_feature_table(path: &Path, table: &FeatureTable) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;

    let mut header: Vec<&str> = META_COLUMNS.to_vec();
    header.extend(table.columns.iter().map(String::as_str));
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record: Vec<String> = vec![
            row.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            row.station.clone(),
            row.category.clone(),
        ];
        record.extend(row.values.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = table.rows.len(), "Feature table written");
    Ok(())
}

/// Reads a feature table previously written by [`write_feature_table`].
///
/// # Errors
///
/// [`PipelineError::MissingAsset`] if the file is absent;
/// [`PipelineError::SchemaMismatch`] if the header or a row does not
/// follow the written layout.
pub fn load_feature_table(path: &Path) -> Result<FeatureTable, PipelineError> {
    let mut reader = csv::Reader::from_path(path).map_err(|_| PipelineError::MissingAsset {
        path: path.to_path_buf(),
    })?;

    let header = reader
        .headers()
        .map_err(|e| PipelineError::SchemaMismatch(format!("unreadable header: {e}")))?
        .clone();
    if header.len() < META_COLUMNS.len()
        || META_COLUMNS
            .iter()
            .zip(header.iter())
            .any(|(expected, actual)| *expected != actual)
    {
        return Err(PipelineError::SchemaMismatch(format!(
            "feature table {} does not start with {META_COLUMNS:?}",
            path.display()
        )));
    }
    let columns: Vec<String> = header
        .iter()
        .skip(META_COLUMNS.len())
        .map(|c| c.to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record =
            result.map_err(|e| PipelineError::SchemaMismatch(format!("unreadable row: {e}")))?;
        let timestamp = timestamp_format::parse(&record[0]).ok_or_else(|| {
            PipelineError::SchemaMismatch(format!("unreadable date: {}", &record[0]))
        })?;
        let values: Vec<f64> = record
            .iter()
            .skip(META_COLUMNS.len())
            .map(|v| {
                v.parse::<f64>().map_err(|_| {
                    PipelineError::SchemaMismatch(format!("non-numeric feature value: {v}"))
                })
            })
            .collect::<Result<_, _>>()?;
        if values.len() != columns.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "row has {} values for {} columns",
                values.len(),
                columns.len()
            )));
        }
        rows.push(FeatureRow {
            timestamp,
            station: record[1].to_string(),
            category: record[2].to_string(),
            values,
        });
    }

    debug!(path = %path.display(), rows = rows.len(), "Feature table loaded");
    Ok(FeatureTable { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn sample_table() -> FeatureTable {
        FeatureTable {
            columns: vec!["pm25".to_string(), "jam".to_string()],
            rows: vec![FeatureRow {
                timestamp: NaiveDate::from_ymd_opt(2021, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                station: "DKI1 Bunderan HI".to_string(),
                category: "SEDANG".to_string(),
                values: vec![42.5, 0.0],
            }],
        }
    }

    #[test]
    fn test_feature_table_round_trip() {
        let path = temp_path("ispu_recommender_test_table.csv");
        let _ = fs::remove_file(&path);

        let table = sample_table();
        write_feature_table(&path, &table).unwrap();
        let loaded = load_feature_table(&path).unwrap();

        assert_eq!(loaded.columns, table.columns);
        assert_eq!(loaded.rows.len(), 1);
        assert_eq!(loaded.rows[0].station, table.rows[0].station);
        assert_eq!(loaded.rows[0].values, table.rows[0].values);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_feature_table_missing_is_missing_asset() {
        let err = load_feature_table(Path::new("/nonexistent/table.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingAsset { .. }));
    }

    #[test]
    fn test_load_feature_table_bad_header_is_schema_mismatch() {
        let path = temp_path("ispu_recommender_test_bad_header.csv");
        fs::write(&path, "a,b,c\n1,2,3\n").unwrap();

        let err = load_feature_table(&path).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_creates_file() {
        #[derive(Serialize)]
        struct Row {
            station: String,
            probability: f64,
        }

        let path = temp_path("ispu_recommender_test_append.csv");
        let _ = fs::remove_file(&path);

        let row = Row {
            station: "DKI1 Bunderan HI".to_string(),
            probability: 0.42,
        };
        append_record(path.to_str().unwrap(), &row).unwrap();
        append_record(path.to_str().unwrap(), &row).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        // Header line should appear exactly once
        let header_count = content.lines().filter(|l| l.contains("station")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&sample_table());
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&sample_table().columns).unwrap();
    }
}
