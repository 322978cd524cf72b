//! CLI entry point for the ISPU recommendation pipeline.
//!
//! Provides subcommands for training the classifier over the merged
//! observation table, evaluating the persisted assets, scoring a target
//! station into a fused recommendation, and rendering the historical
//! tracking log.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ispu_recommender::{
    config::PipelineConfig,
    evaluate::evaluate,
    features::engineer_features,
    history::build_history,
    model::{ModelAssets, train_classifier},
    normalize::{canonical_station, load_observations, normalize},
    output::{append_record, load_feature_table, print_json, write_feature_table},
    recommend::recommend,
    similarity::SimilarityMatrix,
};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "ispu_recommender")]
#[command(about = "Air-quality recommendation pipeline for Jakarta monitoring stations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize the merged observation table, engineer features, train
    /// the classifier, and persist the feature table and asset bundle
    Train {
        /// Merged multi-year observation CSV
        #[arg(short, long, default_value = "data/data_kualitas_udara_gabungan_final.csv")]
        input: String,

        /// Engineered feature table to write
        #[arg(short, long, default_value = "data/data_ispu_features.csv")]
        features: String,

        /// Directory for the model/scaler/feature-list bundle
        #[arg(short, long, default_value = "assets")]
        assets_dir: String,
    },
    /// Evaluate the persisted assets on the reproduced test split
    Evaluate {
        /// Engineered feature table
        #[arg(short, long, default_value = "data/data_ispu_features.csv")]
        features: String,

        /// Directory holding the asset bundle
        #[arg(short, long, default_value = "assets")]
        assets_dir: String,

        /// Decision threshold on the predicted probability
        #[arg(short, long, default_value_t = 0.70)]
        threshold: f64,
    },
    /// Score the latest observation for a station and print the fused
    /// recommendation as JSON
    Recommend {
        /// Target station (any known alias)
        #[arg(value_name = "STATION")]
        station: String,

        /// Engineered feature table
        #[arg(short, long, default_value = "data/data_ispu_features.csv")]
        features: String,

        /// Directory holding the asset bundle
        #[arg(short, long, default_value = "assets")]
        assets_dir: String,

        /// Optional CSV file to append the recommendation to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Print the historical tracking log (actual and policy
    /// recommendations for recorded rows)
    History {
        /// Engineered feature table
        #[arg(short, long, default_value = "data/data_ispu_features.csv")]
        features: String,

        /// Inclusive start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Inclusive end date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Maximum number of entries, newest first
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/ispu_recommender.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("ispu_recommender.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            input,
            features,
            assets_dir,
        } => {
            let cfg = PipelineConfig {
                merged_data_path: PathBuf::from(&input),
                feature_table_path: PathBuf::from(&features),
                assets_dir: PathBuf::from(&assets_dir),
                ..PipelineConfig::default()
            };
            run_train(&cfg)?;
        }
        Commands::Evaluate {
            features,
            assets_dir,
            threshold,
        } => {
            let cfg = PipelineConfig {
                feature_table_path: PathBuf::from(&features),
                assets_dir: PathBuf::from(&assets_dir),
                classifier_threshold: threshold,
                ..PipelineConfig::default()
            };
            let table = load_feature_table(&cfg.feature_table_path)?;
            let assets = ModelAssets::load(&cfg.assets_dir)?;
            let report = evaluate(&assets, &table, cfg.classifier_threshold, &cfg)?;
            println!("{report}");
        }
        Commands::Recommend {
            station,
            features,
            assets_dir,
            output,
        } => {
            let cfg = PipelineConfig {
                feature_table_path: PathBuf::from(&features),
                assets_dir: PathBuf::from(&assets_dir),
                ..PipelineConfig::default()
            };
            run_recommend(&station, output.as_deref(), &cfg)?;
        }
        Commands::History {
            features,
            from,
            to,
            limit,
        } => {
            let cfg = PipelineConfig {
                feature_table_path: PathBuf::from(&features),
                ..PipelineConfig::default()
            };
            let table = load_feature_table(&cfg.feature_table_path)?;
            let records = build_history(&table, from, to, limit, &cfg)?;
            info!(entries = records.len(), "Historical tracking log built");
            print_json(&records)?;
        }
    }

    Ok(())
}

/// Runs the full offline training step: normalize, engineer, persist,
/// train, persist assets, and report held-out quality.
fn run_train(cfg: &PipelineConfig) -> Result<()> {
    let observations = load_observations(&cfg.merged_data_path)?;
    info!(rows = observations.len(), "Observations loaded");

    let normalized = normalize(observations);
    info!(
        rows = normalized.observations.len(),
        duplicates_removed = normalized.duplicates_removed,
        unattributed_removed = normalized.unattributed_removed,
        "Observation set normalized"
    );

    let report = engineer_features(&normalized.observations, cfg)?;
    info!(
        rows = report.table.len(),
        lag_roll_imputed = report.lag_roll_imputed,
        rows_dropped = report.rows_dropped,
        "Features engineered"
    );

    write_feature_table(&cfg.feature_table_path, &report.table)?;

    let outcome = train_classifier(&report.table, cfg)?;
    outcome.assets.save(&cfg.assets_dir)?;

    println!("{}", outcome.report);
    Ok(())
}

/// Scores the latest recorded observation for the target station.
fn run_recommend(station: &str, output: Option<&str>, cfg: &PipelineConfig) -> Result<()> {
    let table = load_feature_table(&cfg.feature_table_path)?;
    let assets = ModelAssets::load(&cfg.assets_dir)?;
    let similarity = SimilarityMatrix::from_table(&table, cfg.similarity_pollutant)?;

    let target = canonical_station(station);
    let latest = table
        .rows
        .iter()
        .filter(|r| r.station == target)
        .max_by_key(|r| r.timestamp);

    let Some(row) = latest else {
        error!(station = %target, "No recorded observations for station");
        anyhow::bail!("no recorded observations for station '{target}'");
    };

    info!(station = %target, timestamp = %row.timestamp, "Scoring latest observation");
    let recommendation = recommend(&table.columns, row, &target, &similarity, &assets, cfg)?;

    print_json(&recommendation)?;
    if let Some(path) = output {
        append_record(path, &recommendation)?;
    }

    Ok(())
}
