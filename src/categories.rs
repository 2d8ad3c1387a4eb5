//! Per-customer category spend and share.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::preprocess::Transaction;

/// What `pct` becomes for a customer whose total spend is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZeroSpendPolicy {
    /// NaN, written as an empty cell. Consumers treat it as unknown.
    #[default]
    Undefined,
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub spend: f64,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerCategoryMix {
    pub shares: BTreeMap<String, CategoryShare>,
    pub primary_category: String,
}

impl CustomerCategoryMix {
    pub fn total_spend(&self) -> f64 {
        self.shares.values().map(|share| share.spend).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryPreferences {
    /// Every observed category label, sorted.
    pub categories: Vec<String>,
    pub by_customer: BTreeMap<String, CustomerCategoryMix>,
}

impl CategoryPreferences {
    /// Column suffix for each category label, unique across the vocabulary.
    /// A clashing slug takes the first free `_2`, `_3`, ... suffix, checked
    /// against every slug already emitted, including other labels' bare slugs.
    pub fn column_slugs(&self) -> Vec<(String, String)> {
        let mut emitted: HashSet<String> = HashSet::new();
        self.categories
            .iter()
            .map(|label| {
                let base = category_slug(label);
                let mut slug = base.clone();
                let mut suffix = 1;
                while !emitted.insert(slug.clone()) {
                    suffix += 1;
                    slug = format!("{base}_{suffix}");
                }
                (label.clone(), slug)
            })
            .collect()
    }
}

pub fn category_preferences(
    transactions: &[Transaction],
    policy: ZeroSpendPolicy,
) -> CategoryPreferences {
    let mut spend: BTreeMap<&str, BTreeMap<&str, f64>> = BTreeMap::new();
    let mut categories: BTreeSet<&str> = BTreeSet::new();

    for tx in transactions.iter().filter(|tx| !tx.customer_id.is_empty()) {
        categories.insert(tx.category.as_str());
        *spend
            .entry(tx.customer_id.as_str())
            .or_default()
            .entry(tx.category.as_str())
            .or_insert(0.0) += tx.total_amount;
    }

    let by_customer = spend
        .into_iter()
        .map(|(customer_id, per_category)| {
            let total: f64 = categories
                .iter()
                .map(|category| per_category.get(category).copied().unwrap_or(0.0))
                .sum();
            let mut shares = BTreeMap::new();
            let mut primary: Option<(&str, f64)> = None;

            for category in &categories {
                let amount = per_category.get(category).copied().unwrap_or(0.0);
                if primary.map_or(true, |(_, best)| amount > best) {
                    primary = Some((*category, amount));
                }
                let pct = if total != 0.0 {
                    amount / total * 100.0
                } else {
                    match policy {
                        ZeroSpendPolicy::Undefined => f64::NAN,
                        ZeroSpendPolicy::Zero => 0.0,
                    }
                };
                shares.insert(category.to_string(), CategoryShare { spend: amount, pct });
            }

            let mix = CustomerCategoryMix {
                shares,
                primary_category: primary
                    .map(|(category, _)| category.to_string())
                    .unwrap_or_default(),
            };
            (customer_id.to_string(), mix)
        })
        .collect();

    CategoryPreferences {
        categories: categories.into_iter().map(str::to_string).collect(),
        by_customer,
    }
}

/// Lower-cases a label, replaces `&` and runs of whitespace or punctuation
/// with a single `_`, and trims `_` from both ends.
pub fn category_slug(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_sep = false;
    for c in label.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c);
        } else {
            pending_sep = true;
        }
    }
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}
