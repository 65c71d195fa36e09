//! Response validation: untrusted model text → [`ParsedDocument`].
//!
//! Model output is never trusted past this point. [`validate`] is total: it
//! cannot fail and always yields the `{items}` wrapper. A reply that does not
//! parse, or whose top level is not `{"items": [...]}`, becomes an empty list,
//! which the orchestrator reads as "try the next tier". Inside a valid list,
//! each element is checked on its own and a bad element is dropped without
//! touching its neighbours.
//!
//! Item schema:
//!
//! | field      | rule                                                   |
//! |------------|--------------------------------------------------------|
//! | `product`  | required string, non-empty after trim                  |
//! | `supplier` | optional string (`null` counts as absent)              |
//! | `quantity` | optional non-negative whole number (`null` = absent)   |

use crate::document::{ParsedDocument, ParsedItem};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Outcome of checking a whole reply against the document schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid(ParsedDocument),
    Invalid(InvalidReason),
}

/// Why a reply was rejected as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    NotJson,
    NotAnObject,
    MissingItems,
    ItemsNotAList,
}

/// Validate a raw completion string. Never fails.
pub fn validate(raw: &str) -> ParsedDocument {
    match check(raw) {
        Validation::Valid(doc) => {
            if doc.dropped > 0 {
                warn!(
                    "Validator dropped {} malformed item(s), kept {}",
                    doc.dropped,
                    doc.items.len()
                );
            }
            doc
        }
        Validation::Invalid(reason) => {
            warn!("Model reply rejected: {:?}", reason);
            ParsedDocument::empty()
        }
    }
}

/// Parse and schema-check a raw completion string.
pub fn check(raw: &str) -> Validation {
    let body = strip_json_fence(raw);
    match serde_json::from_str::<Value>(body) {
        Ok(value) => check_value(&value),
        Err(e) => {
            debug!("Reply is not JSON: {}", e);
            Validation::Invalid(InvalidReason::NotJson)
        }
    }
}

/// Schema-check an already-parsed JSON value.
pub fn check_value(value: &Value) -> Validation {
    let Some(obj) = value.as_object() else {
        return Validation::Invalid(InvalidReason::NotAnObject);
    };
    let Some(items) = obj.get("items") else {
        return Validation::Invalid(InvalidReason::MissingItems);
    };
    let Some(items) = items.as_array() else {
        return Validation::Invalid(InvalidReason::ItemsNotAList);
    };

    let mut doc = ParsedDocument::empty();
    for item in items {
        match parse_item(item) {
            Some(parsed) => doc.items.push(parsed),
            None => doc.dropped += 1,
        }
    }
    Validation::Valid(doc)
}

/// Check one element against the item schema.
fn parse_item(value: &Value) -> Option<ParsedItem> {
    let obj = value.as_object()?;

    let product = obj.get("product")?.as_str()?;
    if product.trim().is_empty() {
        return None;
    }

    let supplier = match obj.get("supplier") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return None,
    };

    let quantity = match obj.get("quantity") {
        None | Some(Value::Null) => None,
        Some(v) => Some(whole_number(v)?),
    };

    Some(ParsedItem {
        supplier,
        product: product.to_string(),
        quantity,
    })
}

/// Non-negative integers, including floats with no fractional part (`6.0`).
fn whole_number(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*)\n```$").unwrap());

/// Unwrap a single outer ```json fence, if that is all there is around the body.
fn strip_json_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match RE_JSON_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn drops_item_without_product() {
        let doc = validate(r#"{"items":[{"supplier":"A","product":"X"},{"supplier":"B"}]}"#);
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].product, "X");
        assert_eq!(doc.items[0].supplier.as_deref(), Some("A"));
        assert_eq!(doc.dropped, 1);
    }

    #[test]
    fn drops_blank_products() {
        let doc = validate(r#"{"items":[{"product":"   "},{"product":""},{"product":"Eggs","quantity":12}]}"#);
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].product, "Eggs");
        assert_eq!(doc.items[0].quantity, Some(12));
    }

    #[test]
    fn quantity_rules() {
        let doc = validate(
            r#"{"items":[
                {"product":"a","quantity":6},
                {"product":"b","quantity":6.0},
                {"product":"c","quantity":6.5},
                {"product":"d","quantity":-1},
                {"product":"e","quantity":"6"},
                {"product":"f","quantity":null},
                {"product":"g"}
            ]}"#,
        );
        let got: Vec<(&str, Option<u64>)> = doc
            .items
            .iter()
            .map(|i| (i.product.as_str(), i.quantity))
            .collect();
        assert_eq!(
            got,
            vec![("a", Some(6)), ("b", Some(6)), ("f", None), ("g", None)]
        );
        assert_eq!(doc.dropped, 3);
    }

    #[test]
    fn supplier_must_be_string_when_present() {
        let doc = validate(r#"{"items":[{"product":"a","supplier":7},{"product":"b","supplier":null}]}"#);
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].product, "b");
        assert_eq!(doc.items[0].supplier, None);
    }

    #[test]
    fn whole_document_failures_are_empty() {
        for raw in [
            "",
            "not json",
            "null",
            "[]",
            "42",
            r#"{"products":[]}"#,
            r#"{"items":{"product":"x"}}"#,
            r#"{"items":null}"#,
        ] {
            let doc = validate(raw);
            assert!(doc.items.is_empty(), "input {raw:?}");
        }
    }

    #[test]
    fn reasons_are_specific() {
        assert_eq!(check("nope"), Validation::Invalid(InvalidReason::NotJson));
        assert_eq!(check("[1]"), Validation::Invalid(InvalidReason::NotAnObject));
        assert_eq!(check("{}"), Validation::Invalid(InvalidReason::MissingItems));
        assert_eq!(
            check(r#"{"items":"x"}"#),
            Validation::Invalid(InvalidReason::ItemsNotAList)
        );
        assert!(matches!(check(r#"{"items":[]}"#), Validation::Valid(d) if d.items.is_empty()));
    }

    #[test]
    fn empty_items_is_valid_but_empty() {
        let doc = validate(r#"{"items":[]}"#);
        assert!(doc.is_empty());
        assert_eq!(doc.dropped, 0);
    }

    #[test]
    fn outer_json_fence_is_tolerated() {
        let raw = "```json\n{\"items\":[{\"product\":\"Milk\",\"quantity\":2}]}\n```";
        let doc = validate(raw);
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].quantity, Some(2));
    }

    #[test]
    fn prose_around_json_is_rejected() {
        let raw = "Here you go: {\"items\":[{\"product\":\"Milk\"}]}";
        assert!(validate(raw).is_empty());
    }

    #[test]
    fn non_object_elements_are_dropped() {
        let doc = validate(r#"{"items":["Milk", 3, null, {"product":"Eggs"}]}"#);
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.dropped, 3);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(Value::from),
            ".{0,12}".prop_map(Value::String),
            Just(Value::String("product".into())),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::hash_map(
                    prop_oneof![
                        Just("items".to_string()),
                        Just("product".to_string()),
                        Just("supplier".to_string()),
                        Just("quantity".to_string()),
                        "[a-z]{1,6}",
                    ],
                    inner,
                    0..5
                )
                .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn validate_is_total_on_arbitrary_strings(raw in ".{0,200}") {
            let doc = validate(&raw);
            for item in &doc.items {
                prop_assert!(!item.product.trim().is_empty());
            }
        }

        #[test]
        fn validate_is_total_on_arbitrary_json(value in arb_json()) {
            let raw = value.to_string();
            let doc = validate(&raw);
            for item in &doc.items {
                prop_assert!(!item.product.trim().is_empty());
            }
            if !value.get("items").map(Value::is_array).unwrap_or(false) {
                prop_assert!(doc.items.is_empty());
            }
        }
    }
}
