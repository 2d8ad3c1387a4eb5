//! Customer-level train/test partitioning.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::preprocess::CUSTOMER_ID;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_size: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SplitError {
    #[error("table has no {0} column")]
    MissingColumn(&'static str),
    #[error("test_size must be within (0, 1), got {0}")]
    InvalidTestSize(f64),
}

/// Splits rows into `(train, test)` so that every row of a customer lands on
/// the same side. Row order within each side follows the input.
pub fn split_by_customer(table: &Table, cfg: &SplitConfig) -> Result<(Table, Table), SplitError> {
    if !(cfg.test_size > 0.0 && cfg.test_size < 1.0) {
        return Err(SplitError::InvalidTestSize(cfg.test_size));
    }
    let idx = table
        .column_index(CUSTOMER_ID)
        .ok_or(SplitError::MissingColumn(CUSTOMER_ID))?;

    let mut seen = HashSet::new();
    let mut customer_ids: Vec<&str> = table
        .rows
        .iter()
        .map(|row| row[idx].as_str())
        .filter(|id| seen.insert(*id))
        .collect();

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    customer_ids.shuffle(&mut rng);

    let test_count = test_count(customer_ids.len(), cfg.test_size);
    let test_ids: HashSet<&str> = customer_ids[..test_count].iter().copied().collect();

    let test = table.filter_rows(|_, row| test_ids.contains(row[idx].as_str()));
    let train = table.filter_rows(|_, row| !test_ids.contains(row[idx].as_str()));

    info!(
        component = "split",
        event = "split.finish",
        customers = customer_ids.len(),
        test_customers = test_count,
        train_rows = train.height(),
        test_rows = test.height(),
        seed = cfg.seed
    );

    Ok((train, test))
}

fn test_count(customers: usize, test_size: f64) -> usize {
    if customers == 0 {
        return 0;
    }
    let count = (customers as f64 * test_size).ceil() as usize;
    count.clamp(1, customers.saturating_sub(1).max(1))
}
