//! Latest demographic snapshot per customer with one-hot indicators.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::preprocess::Transaction;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub email: Option<String>,
    pub gender: Option<String>,
    pub age: Option<f64>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfiles {
    /// Sorted distinct cities across all latest snapshots.
    pub cities: Vec<String>,
    /// Sorted distinct genders across all latest snapshots.
    pub genders: Vec<String>,
    pub by_customer: BTreeMap<String, CustomerProfile>,
}

impl CustomerProfiles {
    pub fn city_columns(&self) -> Vec<String> {
        self.cities.iter().map(|city| format!("city_{city}")).collect()
    }

    pub fn gender_columns(&self) -> Vec<String> {
        self.genders
            .iter()
            .map(|gender| format!("gender_{gender}"))
            .collect()
    }

    /// 0/1 indicators in `cities` order; a missing city yields all zeros.
    pub fn city_indicators(&self, profile: &CustomerProfile) -> Vec<u8> {
        one_hot(&self.cities, profile.city.as_deref())
    }

    pub fn gender_indicators(&self, profile: &CustomerProfile) -> Vec<u8> {
        one_hot(&self.genders, profile.gender.as_deref())
    }
}

/// Orders transactions by invoice date (stable for ties and undated rows) and
/// keeps, per customer and per field, the last non-missing value.
pub fn customer_profiles(transactions: &[Transaction]) -> CustomerProfiles {
    let mut ordered: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| !tx.customer_id.is_empty())
        .collect();
    ordered.sort_by_key(|tx| tx.invoice_date);

    let mut by_customer: BTreeMap<String, CustomerProfile> = BTreeMap::new();
    for tx in ordered {
        let profile = by_customer.entry(tx.customer_id.clone()).or_default();
        if tx.email.is_some() {
            profile.email.clone_from(&tx.email);
        }
        if tx.gender.is_some() {
            profile.gender.clone_from(&tx.gender);
        }
        if tx.age.is_some() {
            profile.age = tx.age;
        }
        if tx.city.is_some() {
            profile.city.clone_from(&tx.city);
        }
    }

    let cities: BTreeSet<String> = by_customer
        .values()
        .filter_map(|profile| profile.city.clone())
        .collect();
    let genders: BTreeSet<String> = by_customer
        .values()
        .filter_map(|profile| profile.gender.clone())
        .collect();

    CustomerProfiles {
        cities: cities.into_iter().collect(),
        genders: genders.into_iter().collect(),
        by_customer,
    }
}

fn one_hot(vocabulary: &[String], value: Option<&str>) -> Vec<u8> {
    vocabulary
        .iter()
        .map(|entry| u8::from(value == Some(entry.as_str())))
        .collect()
}
