//! Name normalisation and duplicate suppression.
//!
//! Both normalisers trim, lowercase, turn runs of repeated punctuation into a
//! single `.` and collapse whitespace. Supplier names additionally lose a
//! trailing legal-entity suffix (`ltd`, `inc`, `corp`, …) so "Acme Ltd" and
//! "ACME" land on the same key. Product names keep every token, since unit
//! and size markers such as `5kg` are what tell similar products apart.
//!
//! Both functions are idempotent.

use crate::document::{NormalizedItem, ParsedItem};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static RE_PUNCT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.,!?;:]{2,}").unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static RE_ENTITY_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+(?:ltd|limited|inc|incorporated|corp|corporation)\.?$").unwrap()
});

/// Normalise a product name.
pub fn normalize_product(s: &str) -> String {
    shared_rules(s)
}

/// Normalise a supplier name.
pub fn normalize_supplier(s: &str) -> String {
    let mut name = shared_rules(s);
    // "Acme Corp Ltd." needs two passes.
    loop {
        let stripped = RE_ENTITY_SUFFIX.replace(&name, "");
        if stripped.len() == name.len() {
            return name;
        }
        name = stripped.trim().to_string();
    }
}

fn shared_rules(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    let punct = RE_PUNCT_RUN.replace_all(&lowered, ".");
    RE_WHITESPACE.replace_all(&punct, " ").trim().to_string()
}

/// Normalise validated items, assign request-scoped ids and merge
/// duplicates.
///
/// Items are keyed on `(supplier, product)` after normalisation. The first
/// occurrence keeps its position; a later duplicate only contributes a
/// quantity when the first one had none. Items whose product normalises to
/// nothing are discarded.
///
/// Returns the items and the number of duplicates merged away.
pub fn normalize_items(items: Vec<ParsedItem>) -> (Vec<NormalizedItem>, usize) {
    let mut out: Vec<NormalizedItem> = Vec::with_capacity(items.len());
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    let mut duplicates = 0;

    for item in items {
        let product = normalize_product(&item.product);
        if product.is_empty() {
            continue;
        }
        let supplier = item
            .supplier
            .as_deref()
            .map(normalize_supplier)
            .unwrap_or_default();

        let key = (supplier, product);
        if let Some(&idx) = seen.get(&key) {
            duplicates += 1;
            if out[idx].quantity.is_none() {
                out[idx].quantity = item.quantity;
            }
            continue;
        }

        let (supplier, product) = key.clone();
        seen.insert(key, out.len());
        out.push(NormalizedItem {
            id: format!("item-{}", out.len() + 1),
            supplier,
            product,
            quantity: item.quantity,
        });
    }

    (out, duplicates)
}
