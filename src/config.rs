//! Immutable pipeline configuration.
//!
//! One `PipelineConfig` value is built at startup and passed by reference
//! into every component entry point; nothing reads configuration from
//! globals.

use std::path::PathBuf;

use crate::model::TrainConfig;
use crate::observation::Pollutant;

/// Configuration for every stage of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Merged multi-year observation table (input to `train`).
    pub merged_data_path: PathBuf,
    /// Engineered feature table (output of `train`, input to scoring).
    pub feature_table_path: PathBuf,
    /// Directory holding the model/scaler/feature-list bundle.
    pub assets_dir: PathBuf,

    /// Trailing window length for rolling means.
    pub rolling_window: usize,
    /// Pollutant values above this quantile are clipped to it.
    pub outlier_quantile: f64,

    /// Probability at or above which a prediction counts as unhealthy.
    pub classifier_threshold: f64,
    /// Raw fine-particulate reading above which the policy tier is
    /// emergency.
    pub pm25_critical: f64,
    /// Raw fine-particulate reading above which, on a weekday, the policy
    /// tier is mitigation.
    pub pm25_high: f64,

    /// Held-out fraction of the engineered table.
    pub test_fraction: f64,
    /// Seed for the shuffled split; fixed so evaluation runs reproduce the
    /// exact test set of the training run.
    pub split_seed: u64,

    /// Pollutant whose time series drives station similarity.
    pub similarity_pollutant: Pollutant,

    pub train: TrainConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            merged_data_path: PathBuf::from("data/data_kualitas_udara_gabungan_final.csv"),
            feature_table_path: PathBuf::from("data/data_ispu_features.csv"),
            assets_dir: PathBuf::from("assets"),
            rolling_window: 7,
            outlier_quantile: 0.99,
            classifier_threshold: 0.70,
            pm25_critical: 100.0,
            pm25_high: 70.0,
            test_fraction: 0.2,
            split_seed: 42,
            similarity_pollutant: Pollutant::Pm25,
            train: TrainConfig::default(),
        }
    }
}
