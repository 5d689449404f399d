//! Pool integrity checking.
//!
//! The validator recomputes what the write path promised: the object
//! rehashes to its directory name, every mapping rehashes to its path,
//! every canonical identifier in the code is covered by every mapping,
//! and no mapping carries entries the code does not reference. Nothing
//! is ever auto-repaired.

use serde::Serialize;
use tracing::debug;

use glossa_core::errors::{PoolError, PoolResult};
use glossa_core::hash::{function_hash, mapping_hash};
use glossa_core::normalize::{analyze, with_docstring, NormalizeOptions};

use crate::pool::Pool;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub passed: usize,
    pub failures: Vec<ValidationFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationFailure {
    pub hash: String,
    pub reason: String,
}

/// Validate one v1 function and all of its mappings.
pub fn validate_function(pool: &Pool, hash: &str, opts: &NormalizeOptions) -> PoolResult<()> {
    let object = pool.load_function(hash)?;
    let object_path = pool.layout().object_path(hash)?;

    let stripped = with_docstring(&object.normalized_code, Some("")).map_err(|e| {
        PoolError::corruption(&object_path, format!("normalized code does not parse: {e}"))
    })?;
    let recomputed = function_hash(&stripped);
    if recomputed != hash {
        return Err(PoolError::corruption(
            &object_path,
            format!("normalized code rehashes to {recomputed}"),
        ));
    }

    let facts = analyze(&object.normalized_code, opts).map_err(|e| {
        PoolError::corruption(&object_path, format!("canonical code analysis failed: {e}"))
    })?;

    let languages = pool.languages(hash)?;
    if languages.is_empty() {
        return Err(PoolError::corruption(&object_path, "object has no language variants"));
    }

    for language in &languages {
        let mappings = pool.mappings(hash, language)?;
        if mappings.is_empty() {
            return Err(PoolError::corruption(
                pool.layout().language_dir(hash, language)?,
                "language directory has no mappings",
            ));
        }
        for m in &mappings {
            let path = pool.layout().mapping_path(hash, language, m)?;
            let record = pool.load_mapping(hash, language, m)?;

            let rehashed = mapping_hash(&record)?;
            if &rehashed != m {
                return Err(PoolError::corruption(
                    &path,
                    format!("mapping content rehashes to {rehashed}"),
                ));
            }

            for canonical in &facts.canonical_names {
                if !record.name_mapping.contains_key(canonical) {
                    return Err(PoolError::corruption(
                        &path,
                        format!("mapping has no entry for canonical identifier {canonical}"),
                    ));
                }
            }
            for key in record.name_mapping.keys() {
                if !facts.canonical_names.contains(key) {
                    return Err(PoolError::corruption(
                        &path,
                        format!("orphan name_mapping entry {key}"),
                    ));
                }
            }
            for alias_target in record.alias_mapping.keys() {
                if !facts.pool_hashes.contains(alias_target) {
                    return Err(PoolError::corruption(
                        &path,
                        format!("alias_mapping entry {alias_target} is not referenced by the code"),
                    ));
                }
            }
        }
    }

    debug!(hash, languages = languages.len(), "validation passed");
    Ok(())
}

/// Validate every v1 function in the pool.
pub fn validate_all(pool: &Pool, opts: &NormalizeOptions) -> PoolResult<ValidationReport> {
    let mut report = ValidationReport::default();
    for hash in pool.list_functions()? {
        report.checked += 1;
        match validate_function(pool, &hash, opts) {
            Ok(()) => report.passed += 1,
            Err(e) => report.failures.push(ValidationFailure { hash, reason: e.to_string() }),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SaveRequest;
    use glossa_core::model::ObjectMetadata;
    use glossa_core::normalize::normalize;
    use tempfile::TempDir;

    const EN: &str = "def sum_list(items):\n    \"\"\"Sum a list\"\"\"\n    total = 0\n    for item in items:\n        total += item\n    return total\n";

    fn save(pool: &Pool, source: &str, language: &str) -> crate::pool::SaveReceipt {
        let r = normalize(source, &NormalizeOptions::default()).unwrap();
        pool.save_function(SaveRequest {
            function_hash: function_hash(&r.normalized_code_no_docstring),
            language: language.to_string(),
            normalized_code: r.normalized_code.clone(),
            docstring: r.docstring.clone(),
            name_mapping: r.name_mapping.clone(),
            alias_mapping: r.alias_mapping.clone(),
            comment: String::new(),
            metadata: ObjectMetadata::now("tester").unwrap(),
        })
        .unwrap()
    }

    #[test]
    fn clean_pool_validates() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();
        let receipt = save(&pool, EN, "en");
        let opts = NormalizeOptions::default();

        validate_function(&pool, &receipt.function_hash, &opts).unwrap();
        let report = validate_all(&pool, &opts).unwrap();
        assert_eq!((report.checked, report.passed), (1, 1));
        assert!(report.failures.is_empty());
    }

    #[test]
    fn tampered_mapping_fails_validation() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();
        let receipt = save(&pool, EN, "en");
        let opts = NormalizeOptions::default();

        let path = pool
            .layout()
            .mapping_path(&receipt.function_hash, "en", &receipt.mapping_hash)
            .unwrap();
        let mut record: glossa_core::model::MappingRecord =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        record.docstring = "edited after the fact".into();
        std::fs::write(&path, serde_json::to_vec_pretty(&record).unwrap()).unwrap();

        let err = validate_function(&pool, &receipt.function_hash, &opts).unwrap_err();
        assert!(matches!(err, PoolError::Corruption { .. }));

        let report = validate_all(&pool, &opts).unwrap();
        assert_eq!(report.passed, 0);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn incomplete_name_mapping_fails_validation() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();
        let opts = NormalizeOptions::default();

        let r = normalize(EN, &opts).unwrap();
        let mut names = r.name_mapping.clone();
        names.shift_remove("_glossa_v_3");
        let receipt = pool
            .save_function(SaveRequest {
                function_hash: function_hash(&r.normalized_code_no_docstring),
                language: "en".to_string(),
                normalized_code: r.normalized_code.clone(),
                docstring: r.docstring.clone(),
                name_mapping: names,
                alias_mapping: r.alias_mapping.clone(),
                comment: String::new(),
                metadata: ObjectMetadata::now("tester").unwrap(),
            })
            .unwrap();

        let err = validate_function(&pool, &receipt.function_hash, &opts).unwrap_err();
        assert!(matches!(err, PoolError::Corruption { .. }));
        assert!(err.to_string().contains("_glossa_v_3"));
    }
}
