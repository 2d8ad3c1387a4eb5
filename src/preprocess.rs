//! Raw transaction cleaning: date repair, numeric fills and derived fields.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dates::{
    default_date_strategies, format_timestamp, is_missing_date, parse_invoice_date, DateStrategy,
};
use crate::table::Table;

pub const INVOICE_NO: &str = "invoice_no";
pub const CUSTOMER_ID: &str = "customer_id";
pub const CATEGORY: &str = "category";
pub const QUANTITY: &str = "quantity";
pub const PRICE: &str = "price";
pub const DISCOUNT: &str = "discount";
pub const TOTAL_AMOUNT: &str = "total_amount";
pub const INVOICE_DATE: &str = "invoice_date";
pub const EMAIL: &str = "email";
pub const GENDER: &str = "gender";
pub const AGE: &str = "age";
pub const CITY: &str = "city";
pub const YEAR: &str = "year";
pub const MONTH: &str = "month";
pub const DAYS_SINCE_LAST_PURCHASE: &str = "days_since_last_purchase";

const NUMERIC_COLUMNS: [&str; 4] = [QUANTITY, PRICE, DISCOUNT, TOTAL_AMOUNT];

// Aggregate-looking names some exports carry, mapped to their clean names.
const COLUMN_RENAMES: [(&str, &str); 4] = [
    ("discount_mean", DISCOUNT),
    ("total_amount_sum", TOTAL_AMOUNT),
    ("quantity_sum", QUANTITY),
    ("price_mean", PRICE),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Headers accepted as the invoice date column, first match wins.
    pub date_column_candidates: Vec<String>,
    pub date_strategies: Vec<DateStrategy>,
    /// Used as the default date when no value in the column parses.
    /// `None` means today's date (UTC midnight).
    pub fallback_date: Option<NaiveDate>,
    pub unknown_category: String,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            date_column_candidates: vec![
                INVOICE_DATE.to_string(),
                "InvoiceDate".to_string(),
                "date".to_string(),
                "transaction_date".to_string(),
            ],
            date_strategies: default_date_strategies(),
            fallback_date: None,
            unknown_category: "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub invoice_no: Option<String>,
    pub customer_id: String,
    pub category: String,
    pub quantity: f64,
    pub price: f64,
    pub discount: f64,
    pub total_amount: f64,
    pub invoice_date: Option<NaiveDateTime>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub days_since_last_purchase: Option<i64>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub age: Option<f64>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessReport {
    pub rows: u64,
    pub has_date_column: bool,
    pub missing_dates: u64,
    pub unparseable_dates: u64,
    pub filled_numeric_cells: u64,
    pub filled_categories: u64,
    pub default_date: Option<NaiveDateTime>,
}

/// Output of [`preprocess`]: the rewritten table (input shape plus derived
/// columns) and the typed view the extractors consume.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedTransactions {
    pub table: Table,
    pub transactions: Vec<Transaction>,
    pub report: PreprocessReport,
}

/// Cleans a raw transaction table. Never fails: malformed values degrade to
/// defaults. The input table is left untouched.
pub fn preprocess(raw: &Table, cfg: &PreprocessConfig) -> CleanedTransactions {
    let mut table = raw.clone();
    let mut report = PreprocessReport {
        rows: table.height() as u64,
        ..PreprocessReport::default()
    };

    normalize_column_names(&mut table, cfg);

    if !table.has_column(TOTAL_AMOUNT) && table.has_column(QUANTITY) && table.has_column(PRICE) {
        let derived = (0..table.height())
            .map(|row| {
                let qty = parse_number(table.cell(row, QUANTITY).unwrap_or_default());
                let price = parse_number(table.cell(row, PRICE).unwrap_or_default());
                format_number(qty.unwrap_or(0.0) * price.unwrap_or(0.0))
            })
            .collect();
        table.set_column(TOTAL_AMOUNT, derived);
    }

    for column in NUMERIC_COLUMNS {
        if let Some(values) = table.column_values(column) {
            let mut filled = 0u64;
            let cleaned: Vec<String> = values
                .into_iter()
                .map(|raw| match parse_number(raw) {
                    Some(v) => format_number(v),
                    None => {
                        filled += 1;
                        "0".to_string()
                    }
                })
                .collect();
            report.filled_numeric_cells += filled;
            table.set_column(column, cleaned);
        }
    }

    if let Some(values) = table.column_values(CATEGORY) {
        let cleaned: Vec<String> = values
            .into_iter()
            .map(|raw| {
                if raw.trim().is_empty() {
                    report.filled_categories += 1;
                    cfg.unknown_category.clone()
                } else {
                    raw.to_string()
                }
            })
            .collect();
        table.set_column(CATEGORY, cleaned);
    }

    let parsed_dates: Option<Vec<Option<NaiveDateTime>>> =
        table.column_values(INVOICE_DATE).map(|values| {
            values
                .into_iter()
                .map(|raw| {
                    let ts = parse_invoice_date(raw, &cfg.date_strategies);
                    if ts.is_none() {
                        if is_missing_date(raw) {
                            report.missing_dates += 1;
                        } else {
                            report.unparseable_dates += 1;
                        }
                    }
                    ts
                })
                .collect()
        });

    let filled_dates = parsed_dates.map(|parsed| {
        report.has_date_column = true;
        let default_date = default_date(&parsed, cfg.fallback_date);
        report.default_date = Some(default_date);
        let filled = fill_dates(&parsed, default_date);
        apply_date_columns(&mut table, &filled);

        let repaired = report.missing_dates + report.unparseable_dates;
        if repaired > 0 {
            warn!(
                component = "preprocess",
                event = "preprocess.dates.filled",
                missing = report.missing_dates,
                unparseable = report.unparseable_dates,
                default_date = %format_timestamp(&default_date)
            );
        }
        filled
    });

    if let Some(values) = table.column_values(EMAIL) {
        let lowered = values
            .into_iter()
            .map(|raw| raw.trim().to_lowercase())
            .collect();
        table.set_column(EMAIL, lowered);
    }

    let transactions = (0..table.height())
        .map(|row| {
            let invoice_date = filled_dates.as_ref().and_then(|dates| dates.get(row).copied());
            transaction_from_row(&table, row, invoice_date)
        })
        .collect();

    info!(
        component = "preprocess",
        event = "preprocess.finish",
        rows = report.rows,
        has_date_column = report.has_date_column,
        filled_numeric_cells = report.filled_numeric_cells,
        filled_categories = report.filled_categories
    );

    CleanedTransactions {
        table,
        transactions,
        report,
    }
}

fn normalize_column_names(table: &mut Table, cfg: &PreprocessConfig) {
    for (from, to) in COLUMN_RENAMES {
        table.rename_column(from, to);
    }

    if table.has_column(INVOICE_DATE) {
        return;
    }
    let found = cfg
        .date_column_candidates
        .iter()
        .find(|candidate| table.has_column(candidate))
        .cloned();
    if let Some(candidate) = found {
        table.rename_column(&candidate, INVOICE_DATE);
    }
}

/// Latest parsed date, else the configured fallback, else today.
fn default_date(parsed: &[Option<NaiveDateTime>], fallback: Option<NaiveDate>) -> NaiveDateTime {
    parsed
        .iter()
        .flatten()
        .max()
        .copied()
        .unwrap_or_else(|| {
            fallback
                .unwrap_or_else(|| Utc::now().date_naive())
                .and_time(NaiveTime::MIN)
        })
}

fn fill_dates(parsed: &[Option<NaiveDateTime>], default_date: NaiveDateTime) -> Vec<NaiveDateTime> {
    parsed
        .iter()
        .map(|ts| ts.unwrap_or(default_date))
        .collect()
}

fn apply_date_columns(table: &mut Table, filled: &[NaiveDateTime]) {
    let Some(max_date) = filled.iter().max().copied() else {
        return;
    };

    table.set_column(INVOICE_DATE, filled.iter().map(format_timestamp).collect());
    table.set_column(YEAR, filled.iter().map(|ts| ts.year().to_string()).collect());
    table.set_column(MONTH, filled.iter().map(|ts| ts.month().to_string()).collect());
    table.set_column(
        DAYS_SINCE_LAST_PURCHASE,
        filled
            .iter()
            .map(|ts| (max_date - *ts).num_days().to_string())
            .collect(),
    );
}

fn transaction_from_row(
    table: &Table,
    row: usize,
    invoice_date: Option<NaiveDateTime>,
) -> Transaction {
    let text = |name: &str| {
        table
            .cell(row, name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let number = |name: &str| table.cell(row, name).and_then(parse_number).unwrap_or(0.0);

    Transaction {
        invoice_no: text(INVOICE_NO),
        customer_id: text(CUSTOMER_ID).unwrap_or_default(),
        category: text(CATEGORY).unwrap_or_default(),
        quantity: number(QUANTITY),
        price: number(PRICE),
        discount: number(DISCOUNT),
        total_amount: number(TOTAL_AMOUNT),
        invoice_date,
        year: invoice_date.map(|ts| ts.year()),
        month: invoice_date.map(|ts| ts.month()),
        days_since_last_purchase: table
            .cell(row, DAYS_SINCE_LAST_PURCHASE)
            .and_then(|raw| raw.parse().ok()),
        email: text(EMAIL),
        gender: text(GENDER),
        age: table.cell(row, AGE).and_then(parse_number),
        city: text(CITY),
    }
}

/// Parses a numeric cell. Tolerates surrounding whitespace, currency symbols
/// and a trailing percent sign; NaN counts as missing.
///
/// Commas are only accepted as thousands separators (`1,200`, `12,345.5`).
/// A decimal comma such as `1,5` is rejected rather than read as `15`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    strip_thousands(&cleaned)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn strip_thousands(value: &str) -> Option<String> {
    if !value.contains(',') {
        return Some(value.to_string());
    }
    let (integer, fraction) = value.split_once('.').unwrap_or((value, ""));
    if fraction.contains(',') {
        return None;
    }
    let mut groups = integer.split(',');
    let lead = groups
        .next()
        .unwrap_or_default()
        .trim_start_matches(['-', '+']);
    let is_digits = |group: &str| group.chars().all(|c| c.is_ascii_digit());
    if lead.is_empty() || lead.len() > 3 || !is_digits(lead) {
        return None;
    }
    if !groups.all(|group| group.len() == 3 && is_digits(group)) {
        return None;
    }
    Some(value.replace(',', ""))
}

pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}
