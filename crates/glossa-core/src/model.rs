//! Wire models for pool state.
//!
//! `FunctionObject` is the schema-v1 `object.json`; `MappingRecord` is one
//! language variant's `mapping.json`; `V0Record` is the legacy single-file
//! schema consumed by the migrator. These are wire-level models: do not
//! introduce breaking changes for v1.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::errors::{PoolError, PoolResult};

/// The canonical, language-independent representation of one function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionObject {
    pub schema_version: u32,

    /// Function identity: 64 lowercase hex chars.
    pub hash: String,

    pub hash_algorithm: HashAlgorithm,

    /// Canonical source with placeholder identifiers and the placeholder
    /// docstring sentinel.
    pub normalized_code: String,

    pub metadata: ObjectMetadata,
}

/// Hash algorithm enum. Extension point; only sha256 is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
}

/// Object metadata, set at creation and never mutated by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// RFC-3339 UTC creation timestamp.
    pub created: String,

    /// Author recorded at write time, supplied by the boundary.
    pub author: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Hashes of pool functions referenced by the normalized code, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl ObjectMetadata {
    /// Metadata stamped with the current UTC time.
    pub fn now(author: impl Into<String>) -> PoolResult<Self> {
        let created = OffsetDateTime::now_utc()
            .replace_nanosecond(0)
            .map_err(|e| PoolError::invariant(format!("timestamp truncation failed: {e}")))?
            .format(&Rfc3339)
            .map_err(|e| PoolError::invariant(format!("timestamp formatting failed: {e}")))?;
        Ok(Self { created, author: author.into(), tags: Vec::new(), dependencies: Vec::new() })
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags.clear();
        for tag in tags {
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }
}

/// One language variant of an object: everything needed to re-present the
/// canonical code in the author's human language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    /// Author docstring, empty when the author wrote none.
    #[serde(default)]
    pub docstring: String,

    /// Canonical identifier to original identifier, in canonical-id order.
    pub name_mapping: IndexMap<String, String>,

    /// Referenced function hash to the local alias the author bound it to.
    #[serde(default)]
    pub alias_mapping: IndexMap<String, String>,

    /// Free-form variant label.
    #[serde(default)]
    pub comment: String,
}

impl MappingRecord {
    /// Invert `name_mapping` for denormalization. The mapping is a
    /// bijection, so collisions are a corruption of the record.
    pub fn inverse_names(&self) -> PoolResult<IndexMap<String, String>> {
        let mut out = IndexMap::with_capacity(self.name_mapping.len());
        for (canonical, original) in &self.name_mapping {
            if out.insert(original.clone(), canonical.clone()).is_some() {
                return Err(PoolError::invariant(format!(
                    "name_mapping maps two canonical identifiers to {original:?}"
                )));
            }
        }
        Ok(out)
    }
}

/// Legacy v0 record: one JSON file holding the object and every language
/// table together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V0Record {
    pub hash: String,

    /// Canonical source with the author docstring still embedded.
    pub normalized_code: String,

    #[serde(default)]
    pub languages: IndexMap<String, V0Language>,
}

/// Per-language tables of a v0 record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V0Language {
    #[serde(default)]
    pub docstring: String,
    pub name_mapping: IndexMap<String, String>,
    #[serde(default)]
    pub alias_mapping: IndexMap<String, String>,
}

impl V0Language {
    /// Lift a v0 language table into a v1 mapping record.
    pub fn into_mapping(self) -> MappingRecord {
        MappingRecord {
            docstring: self.docstring,
            name_mapping: self.name_mapping,
            alias_mapping: self.alias_mapping,
            comment: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_roundtrip() {
        let obj = FunctionObject {
            schema_version: crate::SCHEMA_VERSION,
            hash: "ab".repeat(32),
            hash_algorithm: HashAlgorithm::Sha256,
            normalized_code: "def _glossa_v_0():\n    \"__glossa_docstring__\"\n    pass\n"
                .to_string(),
            metadata: ObjectMetadata::now("tester").unwrap(),
        };
        let s = serde_json::to_string(&obj).unwrap();
        assert!(s.contains("\"hash_algorithm\":\"sha256\""));
        let back: FunctionObject = serde_json::from_str(&s).unwrap();
        assert_eq!(back.hash, obj.hash);
        assert_eq!(back.hash_algorithm, HashAlgorithm::Sha256);
    }

    #[test]
    fn metadata_created_is_rfc3339() {
        let m = ObjectMetadata::now("tester").unwrap();
        assert!(OffsetDateTime::parse(&m.created, &Rfc3339).is_ok());
    }

    #[test]
    fn mapping_preserves_insertion_order() {
        let mut names = IndexMap::new();
        names.insert("_glossa_v_1".to_string(), "b".to_string());
        names.insert("_glossa_v_0".to_string(), "a".to_string());
        let rec = MappingRecord {
            docstring: String::new(),
            name_mapping: names,
            alias_mapping: IndexMap::new(),
            comment: String::new(),
        };
        let s = serde_json::to_string(&rec).unwrap();
        let v1 = s.find("_glossa_v_1").unwrap();
        let v0 = s.find("_glossa_v_0").unwrap();
        assert!(v1 < v0, "file order follows insertion order");
    }

    #[test]
    fn inverse_names_rejects_collisions() {
        let mut names = IndexMap::new();
        names.insert("_glossa_v_0".to_string(), "x".to_string());
        names.insert("_glossa_v_1".to_string(), "x".to_string());
        let rec = MappingRecord {
            docstring: String::new(),
            name_mapping: names,
            alias_mapping: IndexMap::new(),
            comment: String::new(),
        };
        assert!(rec.inverse_names().is_err());
    }

    #[test]
    fn v0_record_parses_minimal_form() {
        let raw = r#"{
            "hash": "0000000000000000000000000000000000000000000000000000000000000000",
            "normalized_code": "def _glossa_v_0():\n    pass\n",
            "languages": {
                "en": {"name_mapping": {"_glossa_v_0": "noop"}}
            }
        }"#;
        let rec: V0Record = serde_json::from_str(raw).unwrap();
        let m = rec.languages["en"].clone().into_mapping();
        assert_eq!(m.docstring, "");
        assert_eq!(m.name_mapping["_glossa_v_0"], "noop");
    }
}
