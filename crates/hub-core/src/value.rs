//! Structural helpers over context and params values
//!
//! Context and params are `serde_json::Value` trees (number, string, bool,
//! sequence, mapping). These helpers give them the comparison semantics
//! conditions rely on: numbers compare by value regardless of integer or
//! float representation.

use serde_json::Value;

/// Numeric view of a value; only JSON numbers qualify
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Structural equality with numeric normalization (`35 == 35.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Membership test: does `collection` hold `item`?
///
/// Sequences test element equality, strings test substring containment and
/// mappings test key presence. Any other collection never contains anything.
pub fn collection_contains(collection: &Value, item: &Value) -> bool {
    match collection {
        Value::Array(items) => items.iter().any(|v| values_equal(v, item)),
        Value::String(haystack) => item.as_str().is_some_and(|needle| haystack.contains(needle)),
        Value::Object(map) => item.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_compare_by_value() {
        assert!(values_equal(&json!(35), &json!(35.0)));
        assert!(!values_equal(&json!(35), &json!("35")));
    }

    #[test]
    fn test_nested_structures() {
        assert!(values_equal(
            &json!({"a": [1, 2.0], "b": "x"}),
            &json!({"b": "x", "a": [1.0, 2]})
        ));
        assert!(!values_equal(&json!([1, 2]), &json!([1, 2, 3])));
    }

    #[test]
    fn test_as_number_rejects_strings() {
        assert_eq!(as_number(&json!(1.5)), Some(1.5));
        assert_eq!(as_number(&json!("1.5")), None);
        assert_eq!(as_number(&json!(true)), None);
    }

    #[test]
    fn test_collection_contains() {
        assert!(collection_contains(&json!(["a", "b"]), &json!("b")));
        assert!(collection_contains(&json!([1, 2]), &json!(2.0)));
        assert!(collection_contains(&json!("motion_detected"), &json!("motion")));
        assert!(collection_contains(&json!({"premium": true}), &json!("premium")));
        assert!(!collection_contains(&json!(42), &json!(4)));
    }
}
