//! Customer feature engineering for retail segmentation.
//!
//! Stages:
//! - load a delimited transaction export into a [`Table`]
//! - clean it into [`CleanedTransactions`] (date repair, fills, derived fields)
//! - roll it up into a [`CustomerFeatureTable`] (stats, category mix, profile)
//! - optionally persist tables and split customers into train/test sets

mod categories;
mod dates;
mod features;
mod observability;
mod pipeline;
mod preprocess;
mod profile;
mod split;
mod table;

pub use categories::{
    category_preferences, category_slug, CategoryPreferences, CategoryShare, CustomerCategoryMix,
    ZeroSpendPolicy,
};
pub use dates::{default_date_strategies, format_timestamp, parse_invoice_date, DateStrategy};
pub use features::{
    assert_schema_compatible, build_customer_features, CustomerFeatureTable, CustomerStats,
    FeatureColumn, FeatureConfig, FeatureDType, FeatureSchema, SchemaError,
    FEATURE_SCHEMA_VERSION,
};
pub use observability::{
    init_logging, log_app_start, logging_config_from_env, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use pipeline::{
    load_pipeline_config, run_pipeline, ConfigError, PipelineConfig, PipelineError,
    PipelineOutput,
};
pub use preprocess::{
    parse_number, preprocess, CleanedTransactions, PreprocessConfig, PreprocessReport,
    Transaction,
};
pub use profile::{customer_profiles, CustomerProfile, CustomerProfiles};
pub use split::{split_by_customer, SplitConfig, SplitError};
pub use table::{load_table, save_table, LoadError, PersistError, Table};
