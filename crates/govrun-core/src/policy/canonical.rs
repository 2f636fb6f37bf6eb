//! Canonical JSON encoding shared by the policy ETag and the idempotency
//! store: sorted object keys, compact separators.

use serde::Serialize;
use serde_json::Value;

/// Serialize `value` to canonical JSON: object keys sorted, no insignificant
/// whitespace. Used both for policy ETags and idempotency request hashes so
/// that key order never affects the resulting hash.
pub fn canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(canonicalize(&value).to_string())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 of the canonical JSON encoding of `value`, as lowercase hex.
pub fn canonical_hash<T: Serialize>(value: &T) -> serde_json::Result<String> {
    use sha2::{Digest, Sha256};
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::collection::{hash_map, vec as pvec};
    use proptest::prelude::*;
    use serde_json::Value;

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ]
    }

    fn json_value() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(4, 32, 8, |inner| {
            prop_oneof![
                pvec(inner.clone(), 0..4).prop_map(Value::Array),
                hash_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn shuffled(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().map(|(k, v)| (k.clone(), shuffled(v))).collect();
                entries.reverse();
                Value::Object(entries.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(shuffled).collect()),
            other => other.clone(),
        }
    }

    proptest! {
        #[test]
        fn canonical_hash_is_independent_of_key_order(value in json_value()) {
            let permuted = shuffled(&value);
            prop_assert_eq!(canonical_hash(&value).unwrap(), canonical_hash(&permuted).unwrap());
        }

        #[test]
        fn canonical_json_is_independent_of_key_order(value in json_value()) {
            let permuted = shuffled(&value);
            prop_assert_eq!(canonical_json(&value).unwrap(), canonical_json(&permuted).unwrap());
        }
    }
}
