//! Time-series normalization: station-name canonicalization, primary-key
//! deduplication, and chronological ordering.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, error, warn};

use crate::error::PipelineError;
use crate::observation::Observation;

/// Maps a known alias to its full canonical station name.
fn station_alias(name: &str) -> Option<&'static str> {
    match name {
        "DKI1" | "DKI1 Bunderan HI" | "Bunderan HI" => Some("DKI1 Bunderan HI"),
        "DKI2" | "DKI2 Kelapa Gading" | "Kelapa Gading" => Some("DKI2 Kelapa Gading"),
        "DKI3" | "DKI3 Jagakarsa" | "Jagakarsa" => Some("DKI3 Jagakarsa"),
        "DKI4" | "DKI4 Lubang Buaya" | "Lubang Buaya" => Some("DKI4 Lubang Buaya"),
        "DKI5"
        | "DKI5 Kebon Jeruk Jakarta Barat"
        | "Kebon Jeruk Jakarta Barat"
        | "DKI5 (Kebon Jeruk) Jakarta Barat" => Some("DKI5 Kebon Jeruk Jakarta Barat"),
        _ => None,
    }
}

/// Canonicalizes a station name.
///
/// Exact aliases resolve first; otherwise a leading `DKI1`..`DKI5` site
/// code resolves the name. Unknown names pass through trimmed.
pub fn canonical_station(name: &str) -> String {
    let trimmed = name.trim();
    if let Some(canonical) = station_alias(trimmed) {
        return canonical.to_string();
    }
    if let Some(first) = trimmed.split_whitespace().next() {
        if matches!(first, "DKI1" | "DKI2" | "DKI3" | "DKI4" | "DKI5") {
            if let Some(canonical) = station_alias(first) {
                return canonical.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Outcome of normalizing a raw observation collection.
#[derive(Debug)]
pub struct NormalizeReport {
    pub observations: Vec<Observation>,
    /// Rows sharing a (station, date, hour) key with an earlier row.
    pub duplicates_removed: usize,
    /// Rows whose canonical station is not a known DKI monitoring site.
    pub unattributed_removed: usize,
}

/// Produces the canonical observation set: canonical station names, unique
/// (station, date, hour) keys, ascending chronological order per station.
///
/// When several rows share a key, the first occurrence in input order wins.
pub fn normalize(observations: Vec<Observation>) -> NormalizeReport {
    let total = observations.len();

    let mut unattributed_removed = 0usize;
    let mut canonical: Vec<Observation> = Vec::with_capacity(total);
    for mut obs in observations {
        obs.station = canonical_station(&obs.station);
        if obs.station.starts_with("DKI") {
            canonical.push(obs);
        } else {
            unattributed_removed += 1;
        }
    }

    let mut seen: HashSet<(String, NaiveDate, u32)> = HashSet::with_capacity(canonical.len());
    let mut unique: Vec<Observation> = Vec::with_capacity(canonical.len());
    for obs in canonical {
        let key = (obs.station.clone(), obs.date(), obs.hour());
        if seen.insert(key) {
            unique.push(obs);
        }
    }
    let duplicates_removed = total - unattributed_removed - unique.len();

    unique.sort_by(|a, b| a.key().cmp(&b.key()));

    debug!(
        rows = unique.len(),
        duplicates_removed, unattributed_removed, "Observation set normalized"
    );

    NormalizeReport {
        observations: unique,
        duplicates_removed,
        unattributed_removed,
    }
}

/// Loads one observation CSV, skipping unreadable rows with a diagnostic.
///
/// # Errors
///
/// Returns [`PipelineError::MissingAsset`] if the file does not exist or
/// cannot be opened.
pub fn load_observations(path: &Path) -> Result<Vec<Observation>, PipelineError> {
    let mut reader = csv::Reader::from_path(path).map_err(|_| PipelineError::MissingAsset {
        path: path.to_path_buf(),
    })?;

    let mut observations = Vec::new();
    let mut skipped = 0usize;
    for result in reader.deserialize() {
        match result {
            Ok(obs) => observations.push(obs),
            Err(e) => {
                skipped += 1;
                warn!(path = %path.display(), error = %e, "Skipping unreadable row");
            }
        }
    }

    debug!(path = %path.display(), rows = observations.len(), skipped, "Observation file loaded");
    Ok(observations)
}

/// Loads several source files, skipping any that cannot be read.
///
/// A failed source is reported and does not abort the others.
pub fn load_sources(paths: &[std::path::PathBuf]) -> Vec<Observation> {
    let mut observations = Vec::new();
    for path in paths {
        match load_observations(path) {
            Ok(mut rows) => observations.append(&mut rows),
            Err(e) => error!(path = %path.display(), error = %e, "Skipping unreadable source file"),
        }
    }
    observations
}
