//! Canonical JSON encoding used for mapping identity.
//!
//! Rules enforced here:
//! - Object keys are sorted lexicographically (bytewise on UTF-8)
//! - Arrays preserve order
//! - No insignificant whitespace
//! - Strings stay UTF-8; non-ASCII is never escaped
//!
//! Two mapping records with the same fields therefore always produce the
//! same bytes, independent of insertion order or the pretty-printing of
//! the file they were read from.

use serde_json::{Map, Value};

use crate::errors::{PoolError, PoolResult};

/// Recursively rebuild `value` with all object keys sorted.
pub fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), canonical_value(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}

/// Canonical UTF-8 byte encoding of `value`, stable across machines and runs.
pub fn canonical_bytes(value: &Value) -> PoolResult<Vec<u8>> {
    serde_json::to_vec(&canonical_value(value))
        .map_err(|e| PoolError::serialization(format!("canonical json encoding failed: {e}")))
}

/// Byte-equality of canonical forms.
pub fn canonical_eq(a: &Value, b: &Value) -> PoolResult<bool> {
    Ok(canonical_bytes(a)? == canonical_bytes(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_at_every_depth() {
        let v = json!({"b": {"z": 1, "a": 2}, "a": 3});
        let bytes = canonical_bytes(&v).unwrap();
        assert_eq!(bytes, br#"{"a":3,"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn arrays_keep_order() {
        let v = json!({"k": [3, 1, 2]});
        assert_eq!(canonical_bytes(&v).unwrap(), br#"{"k":[3,1,2]}"#);
    }

    #[test]
    fn non_ascii_stays_verbatim() {
        let v = json!({"docstring": "somme d'une liste — résumé"});
        let s = String::from_utf8(canonical_bytes(&v).unwrap()).unwrap();
        assert!(s.contains("somme d'une liste — résumé"));
        assert!(!s.contains("\\u"));
    }

    #[test]
    fn canonical_eq_ignores_insertion_order() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert!(canonical_eq(&a, &b).unwrap());
        assert!(!canonical_eq(&a, &json!({"x": 1, "y": 3})).unwrap());
    }
}
