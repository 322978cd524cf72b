//! Classifier training and scoring: standard scaling, a class-weighted
//! logistic model, the reproducible train/test split, and the persisted
//! asset bundle.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::evaluate::{EvaluationReport, evaluate};
use crate::features::FeatureTable;
use crate::observation::IspuCategory;

pub const MODEL_FILE: &str = "model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const FEATURE_LIST_FILE: &str = "feature_list.json";

/// Per-column standardization fitted once on the training data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    /// Fits means and population standard deviations per column.
    /// Zero-variance columns scale by 1.0 so they pass through centered.
    pub fn fit(x: &Array2<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let mut means = Vec::with_capacity(x.ncols());
        let mut scales = Vec::with_capacity(x.ncols());
        for column in x.axis_iter(Axis(1)) {
            let mean = column.sum() / n;
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            means.push(mean);
            scales.push(if std == 0.0 { 1.0 } else { std });
        }
        Self { means, scales }
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::SchemaMismatch`] if the matrix width does
    /// not match the fitted width.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, PipelineError> {
        if x.ncols() != self.width() {
            return Err(PipelineError::SchemaMismatch(format!(
                "scaler fitted on {} columns, input has {}",
                self.width(),
                x.ncols()
            )));
        }
        let mut scaled = x.clone();
        for (j, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| (v - self.means[j]) / self.scales[j]);
        }
        Ok(scaled)
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, PipelineError> {
        if row.len() != self.width() {
            return Err(PipelineError::SchemaMismatch(format!(
                "scaler fitted on {} columns, row has {}",
                self.width(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .enumerate()
            .map(|(j, v)| (v - self.means[j]) / self.scales[j])
            .collect())
    }
}

/// Gradient-descent hyperparameters for the logistic model.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub l2: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 500,
            l2: 1.0,
        }
    }
}

/// Binary logistic classifier over standardized features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LogisticModel {
    /// Trains by deterministic full-batch gradient descent with L2 penalty
    /// and class weights proportional to inverse class frequency.
    pub fn fit(x: &Array2<f64>, y: &[f64], cfg: &TrainConfig) -> Self {
        let n = x.nrows();
        let d = x.ncols();

        let n_pos = y.iter().filter(|&&v| v >= 0.5).count();
        let n_neg = n - n_pos;
        let w_pos = n as f64 / (2.0 * n_pos.max(1) as f64);
        let w_neg = n as f64 / (2.0 * n_neg.max(1) as f64);

        let y_arr = Array1::from_vec(y.to_vec());
        let sample_w: Array1<f64> = y.iter().map(|&v| if v >= 0.5 { w_pos } else { w_neg }).collect();
        let weight_sum = sample_w.sum().max(f64::MIN_POSITIVE);

        let mut weights = Array1::<f64>::zeros(d);
        let mut intercept = 0.0f64;

        for _ in 0..cfg.max_iter {
            let p = x.dot(&weights).mapv(|z| sigmoid(z + intercept));
            let g = (&p - &y_arr) * &sample_w;
            let grad_w = (x.t().dot(&g) + &weights * cfg.l2) / weight_sum;
            let grad_b = g.sum() / weight_sum;
            weights = weights - grad_w * cfg.learning_rate;
            intercept -= grad_b * cfg.learning_rate;
        }

        Self {
            weights: weights.to_vec(),
            intercept,
        }
    }

    /// Positive-class probability for one standardized row.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let z: f64 = self
            .weights
            .iter()
            .zip(row.iter())
            .map(|(w, v)| w * v)
            .sum::<f64>()
            + self.intercept;
        sigmoid(z)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Shuffled, seeded index split. The single source of truth for both
/// training and evaluation, so a fixed seed reproduces the exact test set.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let n_test = (n as f64 * test_fraction).round() as usize;
    let test = indices[..n_test].to_vec();
    let train = indices[n_test..].to_vec();
    (train, test)
}

/// The matched triple the scoring path depends on: model, scaler, and the
/// exact ordered feature-column list they were fitted with.
///
/// Persisted as three co-versioned JSON files; loaded together and treated
/// as read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAssets {
    pub model: LogisticModel,
    pub scaler: StandardScaler,
    pub feature_names: Vec<String>,
}

impl ModelAssets {
    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(MODEL_FILE), serde_json::to_string_pretty(&self.model)?)?;
        fs::write(dir.join(SCALER_FILE), serde_json::to_string_pretty(&self.scaler)?)?;
        fs::write(
            dir.join(FEATURE_LIST_FILE),
            serde_json::to_string_pretty(&self.feature_names)?,
        )?;
        info!(dir = %dir.display(), features = self.feature_names.len(), "Model assets saved");
        Ok(())
    }

    /// Loads and validates the bundle.
    ///
    /// # Errors
    ///
    /// [`PipelineError::MissingAsset`] names the first absent file;
    /// [`PipelineError::SchemaMismatch`] covers unreadable JSON or an
    /// inconsistent triple.
    pub fn load(dir: &Path) -> Result<Self, PipelineError> {
        let model: LogisticModel = read_json(&dir.join(MODEL_FILE))?;
        let scaler: StandardScaler = read_json(&dir.join(SCALER_FILE))?;
        let feature_names: Vec<String> = read_json(&dir.join(FEATURE_LIST_FILE))?;

        let assets = Self {
            model,
            scaler,
            feature_names,
        };
        assets.validate()?;
        Ok(assets)
    }

    /// Checks that model, scaler, and feature list agree on width.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let d = self.feature_names.len();
        if self.model.weights.len() != d || self.scaler.width() != d {
            return Err(PipelineError::SchemaMismatch(format!(
                "asset bundle disagrees on width: {} features, {} weights, {} scaler columns",
                d,
                self.model.weights.len(),
                self.scaler.width()
            )));
        }
        Ok(())
    }

    /// Scores one observation row against the trained bundle.
    ///
    /// The row is reindexed onto the trained feature list so column order
    /// and identity exactly match training; a feature the row lacks is
    /// filled with zero. Returns the positive-class probability.
    ///
    /// # Errors
    ///
    /// [`PipelineError::SchemaMismatch`] if the bundle is inconsistent, the
    /// row disagrees with its own column list, or no trained feature is
    /// present in the row at all.
    pub fn score(&self, columns: &[String], values: &[f64]) -> Result<f64, PipelineError> {
        self.validate()?;
        if columns.len() != values.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "row has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }

        let mut matched = 0usize;
        let reindexed: Vec<f64> = self
            .feature_names
            .iter()
            .map(|name| match columns.iter().position(|c| c == name) {
                Some(i) => {
                    matched += 1;
                    values[i]
                }
                None => 0.0,
            })
            .collect();

        if matched == 0 {
            return Err(PipelineError::SchemaMismatch(
                "row shares no columns with the trained feature list".to_string(),
            ));
        }

        let scaled = self.scaler.transform_row(&reindexed)?;
        Ok(self.model.predict_proba(&scaled))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T, PipelineError> {
    let content = fs::read_to_string(path).map_err(|_| PipelineError::MissingAsset {
        path: path.clone(),
    })?;
    serde_json::from_str(&content).map_err(|e| {
        PipelineError::SchemaMismatch(format!("asset {} is not readable: {e}", path.display()))
    })
}

/// Result of a training run: the persistable bundle plus the held-out
/// evaluation.
#[derive(Debug)]
pub struct TrainOutcome {
    pub assets: ModelAssets,
    pub report: EvaluationReport,
}

/// Trains the classifier over an engineered feature table.
///
/// The label is the binary unhealthy indicator derived from each row's
/// category. The scaler is fitted on the full engineered matrix before the
/// split, exactly as the evaluation path expects to reproduce it.
///
/// # Errors
///
/// [`PipelineError::EmptyFilter`] for an empty table or a split that
/// leaves no training rows; [`PipelineError::SchemaMismatch`] if the table
/// disagrees with its own column list.
pub fn train_classifier(
    table: &FeatureTable,
    cfg: &PipelineConfig,
) -> Result<TrainOutcome, PipelineError> {
    if table.is_empty() {
        return Err(PipelineError::EmptyFilter(
            "feature table has no rows to train on".to_string(),
        ));
    }

    let feature_names = table.model_feature_names();
    let x = feature_matrix(table, &feature_names)?;
    let y = unhealthy_labels(table);

    let scaler = StandardScaler::fit(&x);
    let x_scaled = scaler.transform(&x)?;

    let (train_idx, test_idx) = train_test_split(table.len(), cfg.test_fraction, cfg.split_seed);
    if train_idx.is_empty() {
        return Err(PipelineError::EmptyFilter(
            "train/test split left no training rows".to_string(),
        ));
    }

    let x_train = x_scaled.select(Axis(0), &train_idx);
    let y_train: Vec<f64> = train_idx.iter().map(|&i| y[i]).collect();

    let positives = y_train.iter().filter(|&&v| v >= 0.5).count();
    info!(
        rows = table.len(),
        train_rows = train_idx.len(),
        test_rows = test_idx.len(),
        features = feature_names.len(),
        train_positives = positives,
        "Training classifier"
    );

    let model = LogisticModel::fit(&x_train, &y_train, &cfg.train);
    let assets = ModelAssets {
        model,
        scaler,
        feature_names,
    };

    let report = evaluate(&assets, table, cfg.classifier_threshold, cfg)?;

    Ok(TrainOutcome { assets, report })
}

/// Binary training labels: 1.0 where the row's category parses as the
/// unhealthy class, 0.0 otherwise.
pub fn unhealthy_labels(table: &FeatureTable) -> Vec<f64> {
    table
        .rows
        .iter()
        .map(|r| {
            if IspuCategory::parse(&r.category) == Some(IspuCategory::Unhealthy) {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Extracts the numeric matrix for the given columns from a feature table.
pub fn feature_matrix(
    table: &FeatureTable,
    feature_names: &[String],
) -> Result<Array2<f64>, PipelineError> {
    let indices: Vec<usize> = feature_names
        .iter()
        .map(|name| {
            table.column_index(name).ok_or_else(|| {
                PipelineError::SchemaMismatch(format!("feature table has no '{name}' column"))
            })
        })
        .collect::<Result<_, _>>()?;

    let mut x = Array2::<f64>::zeros((table.len(), indices.len()));
    for (i, row) in table.rows.iter().enumerate() {
        for (j, &c) in indices.iter().enumerate() {
            x[[i, j]] = row.values[c];
        }
    }
    Ok(x)
}
