//! End-to-end pipeline tests: normalize -> engineer -> train -> fuse.

use std::collections::HashSet;

use chrono::NaiveDate;
use ispu_recommender::config::PipelineConfig;
use ispu_recommender::features::{FeatureRow, FeatureTable, engineer_features};
use ispu_recommender::model::{ModelAssets, train_classifier};
use ispu_recommender::normalize::normalize;
use ispu_recommender::observation::{Observation, Pollutant};
use ispu_recommender::recommend::{NO_CORRELATION_NOTE, PolicyTier, actual_recommendation, recommend};
use ispu_recommender::similarity::SimilarityMatrix;

fn observation(station: &str, date: NaiveDate, pm25: f64) -> Observation {
    let category = if pm25 > 100.0 { "TIDAK SEHAT" } else { "SEDANG" };
    Observation {
        period: None,
        timestamp: date.and_hms_opt(0, 0, 0).unwrap(),
        year: None,
        month: None,
        day: None,
        station: station.to_string(),
        pm10: Some(pm25 * 1.2),
        pm25: Some(pm25),
        so2: Some(15.0),
        co: Some(8.0),
        o3: Some(25.0),
        no2: Some(18.0),
        max_ispu: None,
        critical_parameter: None,
        category: category.to_string(),
    }
}

/// Two stations over six weeks; DKI1 spikes unhealthy mid-series.
fn sample_observations() -> Vec<Observation> {
    let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let mut rows = Vec::new();
    for day in 0..42 {
        let date = start + chrono::Duration::days(day);
        let spike = if (10..20).contains(&day) { 90.0 } else { 0.0 };
        rows.push(observation("DKI1", date, 40.0 + spike + day as f64 * 0.5));
        rows.push(observation("DKI2 Kelapa Gading", date, 35.0 + day as f64 * 0.4));
    }
    rows
}

fn trained_pipeline() -> (FeatureTable, ModelAssets, SimilarityMatrix, PipelineConfig) {
    let cfg = PipelineConfig::default();
    let normalized = normalize(sample_observations());
    let report = engineer_features(&normalized.observations, &cfg).unwrap();
    let outcome = train_classifier(&report.table, &cfg).unwrap();
    let similarity = SimilarityMatrix::from_table(&report.table, cfg.similarity_pollutant).unwrap();
    (report.table, outcome.assets, similarity, cfg)
}

/// Copies a row and overrides named columns, for scenario inputs.
fn row_with(table: &FeatureTable, overrides: &[(&str, f64)]) -> FeatureRow {
    let mut row = table.rows[0].clone();
    for (name, value) in overrides {
        let idx = table.column_index(name).unwrap();
        row.values[idx] = *value;
    }
    row
}

#[test]
fn test_normalized_keys_are_unique() {
    let mut rows = sample_observations();
    // inject duplicates and an alias of an existing key
    rows.push(rows[0].clone());
    let mut alias = rows[1].clone();
    alias.station = "Kelapa Gading".to_string();
    rows.push(alias);

    let report = normalize(rows);
    let mut seen = HashSet::new();
    for o in &report.observations {
        assert!(
            seen.insert((o.station.clone(), o.date(), o.hour())),
            "duplicate key survived normalization"
        );
    }
    assert_eq!(report.duplicates_removed, 2);
}

#[test]
fn test_feature_engineering_is_idempotent_end_to_end() {
    let cfg = PipelineConfig::default();
    let normalized = normalize(sample_observations());
    let a = engineer_features(&normalized.observations, &cfg).unwrap();
    let b = engineer_features(&normalized.observations, &cfg).unwrap();
    assert_eq!(a.table, b.table);
}

#[test]
fn test_similarity_self_score_is_one() {
    let (_table, _, similarity, _) = trained_pipeline();
    for station in similarity.stations() {
        let score = similarity.score(station, station).unwrap();
        assert!((score - 1.0).abs() < 1e-12, "{station}: {score}");
    }
}

#[test]
fn test_scenario_a_critical_weekday_is_emergency() {
    let (table, assets, similarity, cfg) = trained_pipeline();
    // Monday with a critical fine-particulate reading
    let row = row_with(
        &table,
        &[
            (Pollutant::Pm25.column_name(), 150.0),
            ("hari_dalam_minggu", 0.0),
        ],
    );
    let result = recommend(&table.columns, &row, "DKI1 Bunderan HI", &similarity, &assets, &cfg)
        .unwrap();
    assert_eq!(result.policy_tier, PolicyTier::Emergency);
}

#[test]
fn test_scenario_b_high_weekend_is_routine() {
    let (table, assets, similarity, cfg) = trained_pipeline();
    // Saturday: the weekday condition fails, high reading stays routine
    let row = row_with(
        &table,
        &[
            (Pollutant::Pm25.column_name(), 80.0),
            ("hari_dalam_minggu", 5.0),
        ],
    );
    let result = recommend(&table.columns, &row, "DKI1 Bunderan HI", &similarity, &assets, &cfg)
        .unwrap();
    assert_eq!(result.policy_tier, PolicyTier::Routine);
}

#[test]
fn test_scenario_c_actual_recommendation_labels() {
    assert_eq!(
        actual_recommendation("TIDAK SEHAT"),
        "Avoid outdoor activity, mask required"
    );
    assert_eq!(actual_recommendation("BAIK"), "Normal activity, air is safe");
    assert_eq!(actual_recommendation("MENDUNG"), "Re-check status");
}

#[test]
fn test_scenario_d_absent_station_gets_fallback_note() {
    let (table, assets, similarity, cfg) = trained_pipeline();
    let row = table.rows[0].clone();
    let result = recommend(&table.columns, &row, "DKI9 Tidak Ada", &similarity, &assets, &cfg)
        .unwrap();
    assert_eq!(result.similarity_note, NO_CORRELATION_NOTE);
}

#[test]
fn test_recommendation_bundle_is_complete() {
    let (table, assets, similarity, cfg) = trained_pipeline();
    let row = table.rows.last().unwrap().clone();
    let result = recommend(
        &table.columns,
        &row,
        "DKI2 Kelapa Gading",
        &similarity,
        &assets,
        &cfg,
    )
    .unwrap();

    assert_eq!(result.station, "DKI2 Kelapa Gading");
    assert!((0.0..=1.0).contains(&result.probability));
    assert!(!result.primary_action.is_empty());
    assert!(!result.policy_action.is_empty());
    // the other station exists in the matrix, so the note names it
    assert!(result.similarity_note.contains("DKI1 Bunderan HI"));
}

#[test]
fn test_assets_round_trip_preserves_scores() {
    let (table, assets, _, _) = trained_pipeline();

    let dir = std::env::temp_dir().join("ispu_recommender_e2e_assets");
    let _ = std::fs::remove_dir_all(&dir);
    assets.save(&dir).unwrap();
    let reloaded = ModelAssets::load(&dir).unwrap();

    let row = &table.rows[3];
    let before = assets.score(&table.columns, &row.values).unwrap();
    let after = reloaded.score(&table.columns, &row.values).unwrap();
    assert!((before - after).abs() < 1e-12);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_training_reports_on_held_out_rows() {
    let cfg = PipelineConfig::default();
    let normalized = normalize(sample_observations());
    let report = engineer_features(&normalized.observations, &cfg).unwrap();
    let outcome = train_classifier(&report.table, &cfg).unwrap();

    let expected_test = (report.table.len() as f64 * cfg.test_fraction).round() as usize;
    assert_eq!(outcome.report.test_rows, expected_test);
    assert_eq!(outcome.report.threshold, cfg.classifier_threshold);
}
