//! Error taxonomy for the recommendation pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the pipeline's library seams.
///
/// Ingestion failures are recovered per source file and never reach this
/// type; a missing or inconsistent asset aborts only the operation that
/// requested it.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required persisted file (data table, model, scaler, feature list)
    /// is absent or unreadable.
    #[error("missing asset: {path}")]
    MissingAsset { path: PathBuf },

    /// An input cannot be reindexed onto the trained feature list, or the
    /// model/scaler/feature-list triple is internally inconsistent.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A caller-supplied filter matched zero rows.
    #[error("filter matched no rows: {0}")]
    EmptyFilter(String),
}
