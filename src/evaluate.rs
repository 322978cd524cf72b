//! Evaluation harness for the trained classifier.
//!
//! Reproduces the training-time split from the persisted assets and
//! reports a confusion matrix and per-class metrics at a configurable
//! probability threshold.

use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::features::FeatureTable;
use crate::model::{ModelAssets, feature_matrix, train_test_split, unhealthy_labels};
use crate::recommend::is_unhealthy;

/// Binary confusion matrix. Rows are actual, columns predicted.
#[derive(Debug, Clone, Serialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

/// Precision/recall/F1 for one class.
#[derive(Debug, Clone, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Held-out evaluation of the classifier at one decision threshold.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub threshold: f64,
    pub test_rows: usize,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    /// Metrics for the safe/moderate class (label 0).
    pub negative: ClassMetrics,
    /// Metrics for the unhealthy class (label 1).
    pub positive: ClassMetrics,
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "threshold: {:.2}", self.threshold)?;
        writeln!(
            f,
            "confusion [actual x predicted]: [[{} {}] [{} {}]]",
            self.confusion.true_negative,
            self.confusion.false_positive,
            self.confusion.false_negative,
            self.confusion.true_positive
        )?;
        writeln!(
            f,
            "class 0 (safe/moderate): precision {:.2} recall {:.2} f1 {:.2} support {}",
            self.negative.precision, self.negative.recall, self.negative.f1, self.negative.support
        )?;
        writeln!(
            f,
            "class 1 (unhealthy):     precision {:.2} recall {:.2} f1 {:.2} support {}",
            self.positive.precision, self.positive.recall, self.positive.f1, self.positive.support
        )?;
        write!(
            f,
            "accuracy: {:.3} over {} test rows",
            self.accuracy, self.test_rows
        )
    }
}

/// Evaluates the persisted assets against the feature table.
///
/// The matrix is rebuilt from the persisted feature list, transformed with
/// the persisted scaler (never refit), and split with the configured seed
/// so the test set is identical to the training run's. Predictions at or
/// above the threshold count as unhealthy.
///
/// # Errors
///
/// [`PipelineError::SchemaMismatch`] if the table cannot serve the
/// persisted feature list; [`PipelineError::EmptyFilter`] if the split
/// leaves no test rows.
pub fn evaluate(
    assets: &ModelAssets,
    table: &FeatureTable,
    threshold: f64,
    cfg: &PipelineConfig,
) -> Result<EvaluationReport, PipelineError> {
    assets.validate()?;

    let x = feature_matrix(table, &assets.feature_names)?;
    let scaled = assets.scaler.transform(&x)?;
    let labels = unhealthy_labels(table);

    let (_, test_idx) = train_test_split(table.len(), cfg.test_fraction, cfg.split_seed);
    if test_idx.is_empty() {
        return Err(PipelineError::EmptyFilter(
            "train/test split left no test rows".to_string(),
        ));
    }

    let (mut tn, mut fp, mut fn_, mut tp) = (0usize, 0usize, 0usize, 0usize);
    for &i in &test_idx {
        let row = scaled.row(i).to_vec();
        let proba = assets.model.predict_proba(&row);
        let predicted = is_unhealthy(proba, threshold);
        let actual = labels[i] >= 0.5;
        match (actual, predicted) {
            (false, false) => tn += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (true, true) => tp += 1,
        }
    }

    let report = EvaluationReport {
        threshold,
        test_rows: test_idx.len(),
        accuracy: ratio(tn + tp, test_idx.len()),
        confusion: ConfusionMatrix {
            true_negative: tn,
            false_positive: fp,
            false_negative: fn_,
            true_positive: tp,
        },
        negative: ClassMetrics::from_counts(tn, fn_, fp),
        positive: ClassMetrics::from_counts(tp, fp, fn_),
    };

    info!(
        threshold,
        accuracy = report.accuracy,
        positive_f1 = report.positive.f1,
        "Evaluation complete"
    );
    Ok(report)
}
