//! End-to-end load → preprocess → aggregate → persist driver.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::features::{build_customer_features, CustomerFeatureTable, FeatureConfig};
use crate::observability::LoggingConfig;
use crate::preprocess::{preprocess, CleanedTransactions, PreprocessConfig};
use crate::split::SplitConfig;
use crate::table::{load_table, save_table, LoadError, PersistError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub features: FeatureConfig,
    pub split: SplitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub cleaned: CleanedTransactions,
    pub features: CustomerFeatureTable,
}

/// Reads a JSON pipeline config; absent fields keep their defaults.
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Loads `input`, cleans it and builds the customer feature table. When
/// `output` is set the flattened feature table is written there.
pub fn run_pipeline(
    input: &Path,
    cfg: &PipelineConfig,
    output: Option<&Path>,
) -> Result<PipelineOutput, PipelineError> {
    info!(
        component = "pipeline",
        event = "pipeline.start",
        input = %input.display(),
        output = ?output.map(|path| path.display().to_string())
    );

    let raw = load_table(input)?;
    let cleaned = preprocess(&raw, &cfg.preprocess);
    let features = build_customer_features(&cleaned, &cfg.features);

    if let Some(path) = output {
        save_table(&features.to_table(), path)?;
    }

    info!(
        component = "pipeline",
        event = "pipeline.finish",
        transactions = cleaned.transactions.len(),
        customers = features.len()
    );

    Ok(PipelineOutput { cleaned, features })
}
