//! Customer-level feature aggregation and the feature table schema.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::categories::{category_preferences, CategoryPreferences, ZeroSpendPolicy};
use crate::dates::format_timestamp;
use crate::preprocess::{format_number, CleanedTransactions, Transaction, CUSTOMER_ID, INVOICE_NO};
use crate::profile::{customer_profiles, CustomerProfiles};
use crate::table::Table;

const DAYS_PER_WEEK: f64 = 7.0;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

const STAT_COLUMNS: [(&str, FeatureDType); 12] = [
    ("transaction_count", FeatureDType::Int),
    ("total_spend", FeatureDType::F64),
    ("average_transaction_value", FeatureDType::F64),
    ("max_transaction_value", FeatureDType::F64),
    ("total_items_purchased", FeatureDType::F64),
    ("average_basket_size", FeatureDType::F64),
    ("average_discount", FeatureDType::F64),
    ("recency", FeatureDType::Int),
    ("first_purchase_date", FeatureDType::Timestamp),
    ("last_purchase_date", FeatureDType::Timestamp),
    ("customer_lifetime", FeatureDType::Int),
    ("purchase_frequency", FeatureDType::F64),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    Int,
    F64,
    Timestamp,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub zero_spend_policy: ZeroSpendPolicy,
    pub schema_version: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            zero_spend_policy: ZeroSpendPolicy::Undefined,
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

/// Group-by statistics for one customer. Date-derived fields are `None` when
/// the input carried no invoice date column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerStats {
    pub transaction_count: u64,
    pub total_spend: f64,
    pub average_transaction_value: f64,
    pub max_transaction_value: f64,
    pub total_items_purchased: f64,
    pub average_basket_size: f64,
    pub average_discount: f64,
    pub recency: Option<i64>,
    pub first_purchase_date: Option<NaiveDateTime>,
    pub last_purchase_date: Option<NaiveDateTime>,
    pub customer_lifetime: Option<i64>,
    pub purchase_frequency: Option<f64>,
}

/// One row per customer, held as three keyed parts until flattened by
/// [`CustomerFeatureTable::to_table`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerFeatureTable {
    pub schema_version: u32,
    pub stats: BTreeMap<String, CustomerStats>,
    pub categories: CategoryPreferences,
    pub profiles: CustomerProfiles,
}

#[derive(Debug, Default)]
struct StatsAccumulator {
    rows: u64,
    invoices: u64,
    spend_sum: f64,
    spend_max: f64,
    quantity_sum: f64,
    discount_sum: f64,
    recency: Option<i64>,
    first: Option<NaiveDateTime>,
    last: Option<NaiveDateTime>,
}

impl StatsAccumulator {
    fn push(&mut self, tx: &Transaction, count_all_rows: bool) {
        self.spend_max = if self.rows == 0 {
            tx.total_amount
        } else {
            self.spend_max.max(tx.total_amount)
        };
        self.rows += 1;
        if count_all_rows || tx.invoice_no.is_some() {
            self.invoices += 1;
        }
        self.spend_sum += tx.total_amount;
        self.quantity_sum += tx.quantity;
        self.discount_sum += tx.discount;
        self.recency = min_option(self.recency, tx.days_since_last_purchase);
        self.first = min_option(self.first, tx.invoice_date);
        self.last = max_option(self.last, tx.invoice_date);
    }

    fn finish(self) -> CustomerStats {
        let n = self.rows as f64;
        let customer_lifetime = match (self.first, self.last) {
            (Some(first), Some(last)) => Some((last - first).num_days()),
            _ => None,
        };
        let purchase_frequency = customer_lifetime.map(|lifetime| {
            self.invoices as f64 / (lifetime as f64 / DAYS_PER_WEEK + 1.0)
        });

        CustomerStats {
            transaction_count: self.invoices,
            total_spend: self.spend_sum,
            average_transaction_value: self.spend_sum / n,
            max_transaction_value: self.spend_max,
            total_items_purchased: self.quantity_sum,
            average_basket_size: self.quantity_sum / n,
            average_discount: self.discount_sum / n,
            recency: self.recency,
            first_purchase_date: self.first,
            last_purchase_date: self.last,
            customer_lifetime,
            purchase_frequency,
        }
    }
}

/// Rolls cleaned transactions up to one row per customer and joins the
/// category preference and profile extracts on `customer_id`.
pub fn build_customer_features(
    cleaned: &CleanedTransactions,
    cfg: &FeatureConfig,
) -> CustomerFeatureTable {
    let count_all_rows = !cleaned.table.has_column(INVOICE_NO);
    let mut accumulators: BTreeMap<&str, StatsAccumulator> = BTreeMap::new();
    for tx in cleaned
        .transactions
        .iter()
        .filter(|tx| !tx.customer_id.is_empty())
    {
        accumulators
            .entry(tx.customer_id.as_str())
            .or_default()
            .push(tx, count_all_rows);
    }

    let stats: BTreeMap<String, CustomerStats> = accumulators
        .into_iter()
        .map(|(customer_id, acc)| (customer_id.to_string(), acc.finish()))
        .collect();

    let table = CustomerFeatureTable {
        schema_version: cfg.schema_version,
        stats,
        categories: category_preferences(&cleaned.transactions, cfg.zero_spend_policy),
        profiles: customer_profiles(&cleaned.transactions),
    };

    info!(
        component = "features",
        event = "features.aggregate.finish",
        transactions = cleaned.transactions.len(),
        customers = table.len(),
        categories = table.categories.categories.len(),
        column_count = table.column_count()
    );

    table
}

impl CustomerFeatureTable {
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn customer_ids(&self) -> impl Iterator<Item = &str> {
        self.stats.keys().map(String::as_str)
    }

    pub fn column_count(&self) -> usize {
        1 + STAT_COLUMNS.len()
            + 2 * self.categories.categories.len()
            + 1
            + 2
            + self.profiles.cities.len()
            + self.profiles.genders.len()
    }

    /// Ordered feature columns, `customer_id` excluded.
    pub fn schema(&self) -> FeatureSchema {
        let mut columns: Vec<FeatureColumn> = STAT_COLUMNS
            .iter()
            .map(|(name, dtype)| column(name, *dtype))
            .collect();

        let slugs = self.categories.column_slugs();
        for (_, slug) in &slugs {
            columns.push(column(&format!("spend_{slug}"), FeatureDType::F64));
        }
        for (_, slug) in &slugs {
            columns.push(column(&format!("pct_{slug}"), FeatureDType::F64));
        }
        columns.push(column("primary_category", FeatureDType::Text));
        columns.push(column("email", FeatureDType::Text));
        columns.push(column("age", FeatureDType::F64));
        for name in self.profiles.city_columns() {
            columns.push(column(&name, FeatureDType::Int));
        }
        for name in self.profiles.gender_columns() {
            columns.push(column(&name, FeatureDType::Int));
        }

        let fingerprint = schema_fingerprint(self.schema_version, &columns);
        FeatureSchema {
            version: self.schema_version,
            fingerprint,
            columns,
        }
    }

    /// Flattens to the external layout: `customer_id` followed by the schema
    /// columns. Undefined values become empty cells.
    pub fn to_table(&self) -> Table {
        let schema = self.schema();
        let mut headers = vec![CUSTOMER_ID.to_string()];
        headers.extend(schema.columns.into_iter().map(|column| column.name));
        let mut table = Table::new(headers);

        let slugs = self.categories.column_slugs();
        for (customer_id, stats) in &self.stats {
            let mut row = vec![customer_id.clone()];
            row.extend(stat_cells(stats));

            let mix = self.categories.by_customer.get(customer_id);
            let share = |label: &str| mix.and_then(|mix| mix.shares.get(label));
            for (label, _) in &slugs {
                row.push(share(label.as_str()).map_or_else(String::new, |s| format_number(s.spend)));
            }
            for (label, _) in &slugs {
                row.push(share(label.as_str()).map_or_else(String::new, |s| format_number(s.pct)));
            }
            row.push(mix.map(|mix| mix.primary_category.clone()).unwrap_or_default());

            let profile = self
                .profiles
                .by_customer
                .get(customer_id)
                .cloned()
                .unwrap_or_default();
            row.push(profile.email.clone().unwrap_or_default());
            row.push(profile.age.map(format_number).unwrap_or_default());
            row.extend(
                self.profiles
                    .city_indicators(&profile)
                    .into_iter()
                    .map(|flag| flag.to_string()),
            );
            row.extend(
                self.profiles
                    .gender_indicators(&profile)
                    .into_iter()
                    .map(|flag| flag.to_string()),
            );

            table.push_row(row);
        }

        table
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), SchemaError> {
    if expected_version != actual.version {
        return Err(SchemaError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(SchemaError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn stat_cells(stats: &CustomerStats) -> Vec<String> {
    let opt_int = |value: Option<i64>| value.map(|v| v.to_string()).unwrap_or_default();
    let opt_ts = |value: Option<NaiveDateTime>| {
        value
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_default()
    };
    vec![
        stats.transaction_count.to_string(),
        format_number(stats.total_spend),
        format_number(stats.average_transaction_value),
        format_number(stats.max_transaction_value),
        format_number(stats.total_items_purchased),
        format_number(stats.average_basket_size),
        format_number(stats.average_discount),
        opt_int(stats.recency),
        opt_ts(stats.first_purchase_date),
        opt_ts(stats.last_purchase_date),
        opt_int(stats.customer_lifetime),
        stats
            .purchase_frequency
            .map(format_number)
            .unwrap_or_default(),
    ]
}

fn column(name: &str, dtype: FeatureDType) -> FeatureColumn {
    FeatureColumn {
        name: name.to_string(),
        dtype,
    }
}

fn schema_fingerprint(version: u32, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{version};"));
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(format!(":{:?};", column.dtype));
    }
    hex::encode(hasher.finalize())
}

fn min_option<T: Ord>(current: Option<T>, candidate: Option<T>) -> Option<T> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_option<T: Ord>(current: Option<T>, candidate: Option<T>) -> Option<T> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
