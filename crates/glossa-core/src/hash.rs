//! Identity hashes for objects and mappings.

use sha2::{Digest, Sha256};

use crate::canonical_json::canonical_bytes;
use crate::errors::{PoolError, PoolResult};
use crate::model::MappingRecord;

/// Lowercase-hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Function identity: SHA-256 of the UTF-8 bytes of the normalized code
/// with the docstring body replaced by the empty literal.
pub fn function_hash(normalized_code_no_docstring: &str) -> String {
    sha256_hex(normalized_code_no_docstring.as_bytes())
}

/// Mapping identity: SHA-256 of the canonical JSON of the four mapping
/// fields (docstring, name_mapping, alias_mapping, comment).
pub fn mapping_hash(record: &MappingRecord) -> PoolResult<String> {
    let value = serde_json::to_value(record)
        .map_err(|e| PoolError::serialization(format!("mapping record encoding failed: {e}")))?;
    Ok(sha256_hex(&canonical_bytes(&value)?))
}

/// Check that `value` is exactly 64 lowercase hex characters.
///
/// Mixed case is rejected outright; the pool never relies on
/// case-insensitive filesystems for correctness.
pub fn validate_hash(value: &str) -> PoolResult<()> {
    if value.len() != 64 || !value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(PoolError::invalid_hash_format(value));
    }
    Ok(())
}

/// Check a free-form language code: 1..=256 chars from `[A-Za-z0-9_-]`.
pub fn validate_language_code(code: &str) -> PoolResult<()> {
    if code.is_empty() || code.len() > 256 {
        return Err(PoolError::invalid_language_code(code));
    }
    if !code.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
        return Err(PoolError::invalid_language_code(code));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn record(docstring: &str) -> MappingRecord {
        let mut names = IndexMap::new();
        names.insert("_glossa_v_0".to_string(), "sum_list".to_string());
        names.insert("_glossa_v_1".to_string(), "items".to_string());
        MappingRecord {
            docstring: docstring.to_string(),
            name_mapping: names,
            alias_mapping: IndexMap::new(),
            comment: String::new(),
        }
    }

    #[test]
    fn function_hash_is_stable() {
        let code = "def _glossa_v_0(_glossa_v_1):\n    \"\"\n    return _glossa_v_1\n";
        assert_eq!(function_hash(code), function_hash(code));
        assert_eq!(function_hash(code).len(), 64);
    }

    #[test]
    fn mapping_hash_ignores_field_order_but_not_content() {
        let a = record("Sum a list");
        let b = record("Sum a list");
        assert_eq!(mapping_hash(&a).unwrap(), mapping_hash(&b).unwrap());
        let c = record("Somme d'une liste");
        assert_ne!(mapping_hash(&a).unwrap(), mapping_hash(&c).unwrap());
    }

    #[test]
    fn mapping_hash_sensitive_to_name_order() {
        // Insertion order is canonical-id order; swapping values changes identity.
        let a = record("");
        let mut b = record("");
        b.name_mapping.insert("_glossa_v_0".to_string(), "items".to_string());
        b.name_mapping.insert("_glossa_v_1".to_string(), "sum_list".to_string());
        assert_ne!(mapping_hash(&a).unwrap(), mapping_hash(&b).unwrap());
    }

    #[test]
    fn hash_validation() {
        assert!(validate_hash(&"a".repeat(64)).is_ok());
        assert!(validate_hash(&"A".repeat(64)).is_err());
        assert!(validate_hash("abc").is_err());
        assert!(validate_hash(&"g".repeat(64)).is_err());
    }

    #[test]
    fn language_code_validation() {
        assert!(validate_language_code("fr").is_ok());
        assert!(validate_language_code("pt-BR").is_ok());
        assert!(validate_language_code("ancient_greek").is_ok());
        assert!(validate_language_code("").is_err());
        assert!(validate_language_code("fr ca").is_err());
        assert!(validate_language_code(&"x".repeat(257)).is_err());
    }
}
