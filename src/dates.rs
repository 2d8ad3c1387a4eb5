//! Invoice date parsing as an ordered chain of strategies.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

const MIXED_DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const MIXED_DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y", "%d %b %Y", "%b %d %Y",
];


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateStrategy {
    /// A single `chrono` format string, date-only or date-time.
    Exact(String),
    /// ISO-8601 / RFC 3339 and a fixed set of common layouts.
    Mixed,
    /// Separator-insensitive day-first/month-first parsing, compact `YYYYMMDD`
    /// and Unix epochs (10 digits for seconds, 13 for milliseconds).
    Lenient,
}

impl DateStrategy {
    pub fn parse(&self, raw: &str) -> Option<NaiveDateTime> {
        match self {
            Self::Exact(format) => parse_with_format(raw, format),
            Self::Mixed => parse_mixed(raw),
            Self::Lenient => parse_lenient(raw),
        }
    }
}

/// Default chain: the day-first layout of the retail exports, then mixed, then lenient.
pub fn default_date_strategies() -> Vec<DateStrategy> {
    vec![
        DateStrategy::Exact("%d/%m/%Y".to_string()),
        DateStrategy::Mixed,
        DateStrategy::Lenient,
    ]
}

/// Tries each strategy in order and returns the first successful parse.
/// `0`, `"0"` and blank values are treated as missing without consulting the chain.
pub fn parse_invoice_date(raw: &str, strategies: &[DateStrategy]) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if is_missing_date(value) {
        return None;
    }
    strategies.iter().find_map(|strategy| strategy.parse(value))
}

pub fn is_missing_date(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || value == "0"
        || value.parse::<f64>().map(|v| v == 0.0).unwrap_or(false)
        || value.eq_ignore_ascii_case("nan")
        || value.eq_ignore_ascii_case("nat")
}

/// `YYYY-MM-DD HH:MM:SS`, with a fractional part only when one is present.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

fn parse_with_format(raw: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, format).ok().or_else(|| {
        NaiveDate::parse_from_str(raw, format)
            .ok()
            .map(|date| date.and_time(NaiveTime::MIN))
    })
}

fn parse_mixed(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    MIXED_DATETIME_FORMATS
        .iter()
        .chain(MIXED_DATE_FORMATS.iter())
        .find_map(|format| parse_with_format(raw, format))
}

fn parse_lenient(raw: &str) -> Option<NaiveDateTime> {
    if raw.chars().all(|c| c.is_ascii_digit()) {
        return parse_digits(raw);
    }

    let date_part = raw
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or(raw);
    let parts: Vec<&str> = date_part
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() != 3 {
        return None;
    }
    let nums: Vec<u32> = parts.iter().filter_map(|p| p.parse().ok()).collect();
    if nums.len() != 3 {
        return None;
    }

    let date = if parts[0].len() == 4 {
        NaiveDate::from_ymd_opt(nums[0] as i32, nums[1], nums[2])
    } else {
        let year = expand_year(parts[2], nums[2]);
        NaiveDate::from_ymd_opt(year, nums[1], nums[0])
            .or_else(|| NaiveDate::from_ymd_opt(year, nums[0], nums[1]))
    };
    date.map(|d| d.and_time(NaiveTime::MIN))
}

fn expand_year(raw: &str, value: u32) -> i32 {
    if raw.len() <= 2 {
        2000 + value as i32
    } else {
        value as i32
    }
}

fn parse_digits(raw: &str) -> Option<NaiveDateTime> {
    match raw.len() {
        8 => {
            let year = raw[..4].parse().ok()?;
            let month = raw[4..6].parse().ok()?;
            let day = raw[6..].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day).map(|d| d.and_time(NaiveTime::MIN))
        }
        10 => DateTime::from_timestamp(raw.parse().ok()?, 0).map(|ts| ts.naive_utc()),
        13 => DateTime::from_timestamp_millis(raw.parse().ok()?).map(|ts| ts.naive_utc()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_time(NaiveTime::MIN)
    }

    #[test]
    fn exact_format_wins_for_day_first_values() {
        let chain = default_date_strategies();
        assert_eq!(parse_invoice_date("05/03/2023", &chain), Some(ymd(2023, 3, 5)));
    }

    #[test]
    fn mixed_handles_iso_and_rfc3339() {
        let chain = default_date_strategies();
        assert_eq!(parse_invoice_date("2023-03-05", &chain), Some(ymd(2023, 3, 5)));
        assert_eq!(
            parse_invoice_date("2010-12-01T08:26:00Z", &chain),
            NaiveDate::from_ymd_opt(2010, 12, 1)
                .unwrap()
                .and_hms_opt(8, 26, 0)
        );
        assert_eq!(
            parse_invoice_date("12/31/2022 10:15", &chain),
            NaiveDate::from_ymd_opt(2022, 12, 31)
                .unwrap()
                .and_hms_opt(10, 15, 0)
        );
    }

    #[test]
    fn lenient_handles_odd_separators_and_epochs() {
        let chain = default_date_strategies();
        assert_eq!(parse_invoice_date("05.03.2023", &chain), Some(ymd(2023, 3, 5)));
        assert_eq!(parse_invoice_date("13.25.2023", &chain), None);
        assert_eq!(parse_invoice_date("1.25.23", &chain), Some(ymd(2023, 1, 25)));
        assert_eq!(parse_invoice_date("1672531200", &chain), Some(ymd(2023, 1, 1)));
        assert_eq!(
            parse_invoice_date("1672531200000", &chain),
            Some(ymd(2023, 1, 1))
        );
    }

    #[test]
    fn compact_dates_are_not_read_as_epochs() {
        let chain = default_date_strategies();
        assert_eq!(parse_invoice_date("20240105", &chain), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_invoice_date("20241305", &chain), None);
        assert_eq!(parse_invoice_date("12345", &chain), None);
        assert_eq!(parse_invoice_date("123456789012", &chain), None);
    }

    #[test]
    fn formatted_timestamps_keep_fractions_only_when_present() {
        assert_eq!(format_timestamp(&ymd(2024, 1, 5)), "2024-01-05 00:00:00");
        let ts = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_milli_opt(10, 0, 0, 750)
            .unwrap();
        assert_eq!(format_timestamp(&ts), "2024-01-05 10:00:00.750");
        assert_eq!(parse_invoice_date(&format_timestamp(&ts), &default_date_strategies()), Some(ts));
    }

    #[test]
    fn zero_and_garbage_are_missing() {
        let chain = default_date_strategies();
        assert_eq!(parse_invoice_date("0", &chain), None);
        assert_eq!(parse_invoice_date("0.0", &chain), None);
        assert_eq!(parse_invoice_date("", &chain), None);
        assert_eq!(parse_invoice_date("not a date", &chain), None);
    }

    #[test]
    fn chain_order_decides_ambiguous_values() {
        let month_first = vec![DateStrategy::Exact("%m/%d/%Y".to_string())];
        assert_eq!(parse_invoice_date("05/03/2023", &month_first), Some(ymd(2023, 5, 3)));
        assert_eq!(parse_invoice_date("25/03/2023", &month_first), None);
    }
}
