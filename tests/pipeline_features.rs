use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use custfeat::{
    assert_schema_compatible, build_customer_features, load_table, preprocess, run_pipeline,
    FeatureConfig, LoadError, PipelineConfig, PipelineError, PreprocessConfig, SchemaError, Table,
    FEATURE_SCHEMA_VERSION,
};
use regex::Regex;
use tempfile::tempdir;

const FIXTURE: &str = "tests/fixtures/transactions_sample.csv";

fn fixture_path() -> &'static Path {
    Path::new(FIXTURE)
}

fn table_from(headers: &[&str], rows: &[&[&str]]) -> Table {
    let mut table = Table::new(headers.iter().map(|h| h.to_string()).collect());
    for row in rows {
        table.push_row(row.iter().map(|c| c.to_string()).collect());
    }
    table
}

fn feature_cell<'a>(table: &'a Table, customer_id: &str, column: &str) -> &'a str {
    let row = table
        .rows
        .iter()
        .position(|row| row[0] == customer_id)
        .expect("customer row must exist");
    table.cell(row, column).expect("column must exist")
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "actual={actual} expected={expected}"
    );
}

#[test]
fn pipeline_is_deterministic() {
    let cfg = PipelineConfig::default();
    let first = run_pipeline(fixture_path(), &cfg, None).expect("first run succeeds");
    let second = run_pipeline(fixture_path(), &cfg, None).expect("second run succeeds");

    assert_eq!(first, second);
    assert_eq!(first.features.to_table(), second.features.to_table());
    assert_eq!(first.features.schema(), second.features.schema());
}

#[test]
fn one_row_per_distinct_customer() {
    let out = run_pipeline(fixture_path(), &PipelineConfig::default(), None).expect("pipeline");
    let distinct: HashSet<&str> = out
        .cleaned
        .transactions
        .iter()
        .map(|tx| tx.customer_id.as_str())
        .collect();

    let table = out.features.to_table();
    assert_eq!(out.cleaned.transactions.len(), 7);
    assert_eq!(table.height(), distinct.len());
    assert_eq!(
        out.features.customer_ids().collect::<Vec<_>>(),
        vec!["C001", "C002", "C003", "C004"]
    );
}

#[test]
fn feature_table_columns_are_unique_and_namespaced() {
    let out = run_pipeline(fixture_path(), &PipelineConfig::default(), None).expect("pipeline");
    let table = out.features.to_table();

    let unique: HashSet<&String> = table.headers.iter().collect();
    assert_eq!(unique.len(), table.headers.len());
    assert_eq!(table.width(), 31);
    assert_eq!(table.width(), out.features.column_count());
    assert_eq!(&table.headers[..2], ["customer_id", "transaction_count"]);

    let category_column = Regex::new(r"^(spend|pct)_[a-z0-9_]+$").expect("valid regex");
    let category_columns: Vec<&String> = table
        .headers
        .iter()
        .filter(|h| h.starts_with("spend_") || h.starts_with("pct_"))
        .collect();
    assert_eq!(category_columns.len(), 10);
    assert!(category_columns.iter().all(|h| category_column.is_match(h)));
    assert!(table.has_column("spend_home_kitchen"));
    assert!(table.has_column("pct_home_kitchen"));

    for column in ["city_Delhi", "city_Mumbai", "city_Pune", "gender_Female", "gender_Male"] {
        assert!(table.has_column(column), "missing {column}");
    }
    assert!(!table.has_column("city_Bengaluru"));
}

#[test]
fn category_percentages_sum_to_one_hundred() {
    let out = run_pipeline(fixture_path(), &PipelineConfig::default(), None).expect("pipeline");
    for (customer_id, mix) in &out.features.categories.by_customer {
        assert!(mix.total_spend() > 0.0, "{customer_id} has spend");
        let pct_sum: f64 = mix.shares.values().map(|share| share.pct).sum();
        assert_close(pct_sum, 100.0);
    }

    let table = out.features.to_table();
    assert_eq!(feature_cell(&table, "C001", "pct_electronics"), "75");
    assert_eq!(feature_cell(&table, "C001", "pct_grocery"), "25");
    assert_eq!(feature_cell(&table, "C001", "spend_books"), "0");
}

#[test]
fn recency_is_measured_from_dataset_max_date() {
    let out = run_pipeline(fixture_path(), &PipelineConfig::default(), None).expect("pipeline");
    let stats = &out.features.stats;

    assert_eq!(stats["C002"].recency, Some(5));
    assert_eq!(stats["C001"].recency, Some(21));
    assert_eq!(stats["C003"].recency, Some(0));
    assert_eq!(
        stats["C002"].last_purchase_date,
        NaiveDate::from_ymd_opt(2024, 3, 26).and_then(|d| d.and_hms_opt(0, 0, 0))
    );
}

#[test]
fn recency_matches_days_before_latest_purchase() {
    let raw = table_from(
        &["invoice_no", "customer_id", "category", "total_amount", "invoice_date"],
        &[
            &["I1", "A", "Grocery", "10", "2024-05-20"],
            &["I2", "B", "Grocery", "10", "2024-05-15"],
            &["I3", "B", "Grocery", "10", "2024-05-01"],
        ],
    );
    let cleaned = preprocess(&raw, &PreprocessConfig::default());
    let features = build_customer_features(&cleaned, &FeatureConfig::default());
    assert_eq!(features.stats["B"].recency, Some(5));
    assert_eq!(features.stats["A"].recency, Some(0));
}

#[test]
fn malformed_dates_take_the_default_date() {
    let out = run_pipeline(fixture_path(), &PipelineConfig::default(), None).expect("pipeline");
    let report = &out.cleaned.report;
    assert!(report.has_date_column);
    assert_eq!(report.missing_dates, 1);
    assert_eq!(report.unparseable_dates, 1);
    assert_eq!(
        report.default_date,
        NaiveDate::from_ymd_opt(2024, 3, 31).and_then(|d| d.and_hms_opt(0, 0, 0))
    );

    let dates = out
        .cleaned
        .table
        .column_values("invoice_date")
        .expect("date column");
    assert_eq!(dates[4], "2024-03-31 00:00:00");
    assert_eq!(dates[5], "2024-03-31 00:00:00");
    assert_eq!(dates[6], "2024-03-21 00:00:00");

    let days = out
        .cleaned
        .table
        .column_values("days_since_last_purchase")
        .expect("days column");
    assert_eq!(days, vec!["30", "21", "5", "0", "0", "0", "10"]);
    assert_eq!(
        out.cleaned.table.column_values("month").expect("month"),
        vec!["3"; 7]
    );
}

#[test]
fn cleaned_table_keeps_passthrough_columns_and_lowercases_email() {
    let out = run_pipeline(fixture_path(), &PipelineConfig::default(), None).expect("pipeline");
    let table = &out.cleaned.table;

    assert_eq!(table.height(), 7);
    assert!(table.has_column("payment_method"));
    assert!(table.has_column("shopping_mall"));
    assert_eq!(table.cell(3, "discount"), Some("0"));
    assert_eq!(table.cell(0, "email"), Some("alice@example.com"));
    assert_eq!(table.cell(5, "email"), Some("dan@example.com"));
}

#[test]
fn primary_category_is_the_highest_spend_label() {
    let out = run_pipeline(fixture_path(), &PipelineConfig::default(), None).expect("pipeline");
    let mixes = &out.features.categories.by_customer;

    assert_eq!(mixes["C001"].shares["Electronics"].spend, 300.0);
    assert_eq!(mixes["C001"].shares["Grocery"].spend, 100.0);
    assert_eq!(mixes["C001"].primary_category, "Electronics");
    assert_eq!(mixes["C002"].primary_category, "Clothing");
    assert_eq!(mixes["C003"].primary_category, "Home & Kitchen");
}

#[test]
fn single_purchase_customer_has_zero_lifetime_and_unit_frequency() {
    let out = run_pipeline(fixture_path(), &PipelineConfig::default(), None).expect("pipeline");
    let c004 = &out.features.stats["C004"];
    assert_eq!(c004.transaction_count, 1);
    assert_eq!(c004.customer_lifetime, Some(0));
    assert_eq!(c004.purchase_frequency, Some(1.0));

    let c001 = &out.features.stats["C001"];
    assert_eq!(c001.customer_lifetime, Some(9));
    assert_close(c001.purchase_frequency.expect("frequency"), 2.0 / (9.0 / 7.0 + 1.0));
}

#[test]
fn profile_uses_latest_transaction_and_one_hot_encodes() {
    let out = run_pipeline(fixture_path(), &PipelineConfig::default(), None).expect("pipeline");
    let table = out.features.to_table();

    assert_eq!(feature_cell(&table, "C002", "city_Delhi"), "1");
    assert_eq!(feature_cell(&table, "C002", "city_Mumbai"), "0");
    assert_eq!(feature_cell(&table, "C002", "gender_Male"), "1");
    assert_eq!(feature_cell(&table, "C004", "city_Delhi"), "0");
    assert_eq!(feature_cell(&table, "C004", "city_Mumbai"), "0");
    assert_eq!(feature_cell(&table, "C004", "city_Pune"), "0");
    assert_eq!(feature_cell(&table, "C004", "email"), "dan@example.com");
    assert_eq!(feature_cell(&table, "C004", "age"), "52");
}

#[test]
fn zero_spend_percentages_are_written_as_empty_cells() {
    let raw = table_from(
        &["invoice_no", "customer_id", "category", "total_amount", "invoice_date"],
        &[
            &["I1", "A", "Grocery", "0", "2024-05-20"],
            &["I2", "B", "Books", "12", "2024-05-20"],
        ],
    );
    let cleaned = preprocess(&raw, &PreprocessConfig::default());
    let features = build_customer_features(&cleaned, &FeatureConfig::default());
    let table = features.to_table();

    assert_eq!(feature_cell(&table, "A", "pct_grocery"), "");
    assert_eq!(feature_cell(&table, "A", "spend_grocery"), "0");
    assert_eq!(feature_cell(&table, "B", "pct_books"), "100");
}

#[test]
fn dateless_input_leaves_date_features_undefined() {
    let raw = table_from(
        &["invoice_no", "customer_id", "category", "total_amount"],
        &[&["I1", "A", "Grocery", "10"], &["I2", "A", "", "5"]],
    );
    let cleaned = preprocess(&raw, &PreprocessConfig::default());
    assert!(!cleaned.report.has_date_column);
    assert_eq!(cleaned.report.filled_categories, 1);

    let features = build_customer_features(&cleaned, &FeatureConfig::default());
    let a = &features.stats["A"];
    assert_eq!(a.recency, None);
    assert_eq!(a.customer_lifetime, None);
    assert_eq!(a.purchase_frequency, None);
    assert_eq!(a.total_spend, 15.0);
    assert_eq!(features.categories.categories, vec!["Grocery", "Unknown"]);

    let table = features.to_table();
    assert_eq!(feature_cell(&table, "A", "recency"), "");
    assert_eq!(feature_cell(&table, "A", "first_purchase_date"), "");
}

#[test]
fn persisted_features_round_trip_through_loader() {
    let dir = tempdir().expect("temp dir");
    let out_path = dir.path().join("out/customer_features.csv");
    let out = run_pipeline(fixture_path(), &PipelineConfig::default(), Some(out_path.as_path()))
        .expect("pipeline");

    let reloaded = load_table(&out_path).expect("persisted features load");
    assert_eq!(reloaded, out.features.to_table());
}

#[test]
fn missing_source_fails_loudly() {
    let dir = tempdir().expect("temp dir");
    let err = run_pipeline(&dir.path().join("absent.csv"), &PipelineConfig::default(), None)
        .expect_err("must fail");
    assert!(matches!(
        err,
        PipelineError::Load(LoadError::SourceNotFound(_))
    ));
}

#[test]
fn schema_compatibility_checks_version_and_fingerprint() {
    let out = run_pipeline(fixture_path(), &PipelineConfig::default(), None).expect("pipeline");
    let schema = out.features.schema();
    assert_eq!(schema.columns.len() + 1, out.features.to_table().width());
    assert_eq!(schema.column_names()[0], "transaction_count");

    assert_schema_compatible(FEATURE_SCHEMA_VERSION, &schema.fingerprint, &schema)
        .expect("compatible");
    assert!(matches!(
        assert_schema_compatible(FEATURE_SCHEMA_VERSION + 1, &schema.fingerprint, &schema),
        Err(SchemaError::SchemaVersionMismatch { .. })
    ));
    assert!(matches!(
        assert_schema_compatible(FEATURE_SCHEMA_VERSION, "stale", &schema),
        Err(SchemaError::SchemaFingerprintMismatch { .. })
    ));
}
