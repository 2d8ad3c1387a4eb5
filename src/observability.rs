//! Logging setup for the feature build.
//!
//! Settings come from the `logging` section of the pipeline config and can be
//! overridden per run through `CUSTFEAT_LOG_*` environment variables.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::pipeline::PipelineConfig;

const ENV_LOG_LEVEL: &str = "CUSTFEAT_LOG_LEVEL";
const ENV_LOG_FORMAT: &str = "CUSTFEAT_LOG_FORMAT";
const ENV_LOG_TARGET: &str = "CUSTFEAT_LOG_TARGET";

const FALLBACK_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    /// One line per event; suited to batch runs writing to a log file.
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `info` or `custfeat=debug,warn`.
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: FALLBACK_FILTER.to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Applies `CUSTFEAT_LOG_*` overrides on top of these settings.
    pub fn with_env_overrides(self) -> Self {
        apply_overrides(self, |key| env::var(key).ok())
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Default settings with `CUSTFEAT_LOG_*` overrides applied.
pub fn logging_config_from_env() -> LoggingConfig {
    LoggingConfig::default().with_env_overrides()
}

/// Installs the global subscriber. Logs go to stderr so stdout stays free for
/// the run summary.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(config.include_target)
        .with_ansi(!matches!(config.format, LogFormat::Json))
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(builder.compact().finish())?
        }
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig, input: &Path, pipeline: &PipelineConfig) {
    info!(
        component = "build_features",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        input = %input.display(),
        date_strategies = pipeline.preprocess.date_strategies.len(),
        zero_spend_policy = ?pipeline.features.zero_spend_policy,
        test_size = pipeline.split.test_size,
        seed = pipeline.split.seed
    );
}

fn apply_overrides(
    mut config: LoggingConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> LoggingConfig {
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        let trimmed = level.trim();
        if !trimmed.is_empty() {
            config.level = trimmed.to_string();
        }
    }
    if let Some(format) = lookup(ENV_LOG_FORMAT).as_deref().and_then(parse_log_format) {
        config.format = format;
    }
    if let Some(include_target) = lookup(ENV_LOG_TARGET).as_deref().and_then(parse_bool) {
        config.include_target = include_target;
    }
    config
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        "compact" => Some(LogFormat::Compact),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
