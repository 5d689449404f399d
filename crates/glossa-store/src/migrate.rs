//! v0 to v1 migration.
//!
//! A v0 record is one JSON file holding the object and every language
//! table. Migration re-verifies the stored hash, synthesizes a v1 object
//! plus one mapping per language through the normal write path, validates
//! the result, and only then (optionally) renames the v0 file aside. On
//! any failure the v0 file is left untouched.

use serde::Serialize;
use tracing::{info, warn};

use glossa_core::errors::{PoolError, PoolResult};
use glossa_core::hash::function_hash;
use glossa_core::model::ObjectMetadata;
use glossa_core::normalize::{analyze, with_docstring, NormalizeOptions};
use glossa_core::DOCSTRING_PLACEHOLDER;

use crate::pool::{Pool, SaveRequest};
use crate::validate::validate_function;

#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateOptions {
    /// Report what would happen without writing anything.
    pub dry_run: bool,
    /// Leave the v0 file in place after a successful migration.
    pub keep_v0: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrateOutcome {
    Migrated { languages: Vec<String> },
    AlreadyMigrated,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrateReport {
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<MigrateFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrateFailure {
    pub hash: String,
    pub reason: String,
}

/// Migrate one function. `author` stamps the freshly created metadata.
pub fn migrate_v0_to_v1(
    pool: &Pool,
    hash: &str,
    author: &str,
    opts: &MigrateOptions,
    normalize_opts: &NormalizeOptions,
) -> PoolResult<MigrateOutcome> {
    let v0_path = pool.layout().v0_path(hash)?;
    if !v0_path.exists() {
        if pool.layout().object_path(hash)?.exists() {
            return Ok(MigrateOutcome::AlreadyMigrated);
        }
        return Err(PoolError::function_not_found(hash));
    }

    let record = pool.load_v0(hash)?;

    // The record must still hash to its own name before anything is written.
    let stripped = with_docstring(&record.normalized_code, Some(""))
        .map_err(|e| PoolError::migration_failed(hash, format!("v0 code does not parse: {e}")))?;
    let recomputed = function_hash(&stripped);
    if recomputed != record.hash {
        return Err(PoolError::migration_failed(
            hash,
            format!("stored hash does not match recomputed {recomputed}"),
        ));
    }

    if already_complete(pool, hash, &record.languages)? {
        return Ok(MigrateOutcome::AlreadyMigrated);
    }

    let normalized_code = with_docstring(&record.normalized_code, Some(DOCSTRING_PLACEHOLDER))
        .map_err(|e| PoolError::migration_failed(hash, format!("sentinel rewrite failed: {e}")))?;

    let languages: Vec<String> = record.languages.keys().cloned().collect();
    if opts.dry_run {
        info!(hash, ?languages, "dry run: migration simulated, nothing written");
        return Ok(MigrateOutcome::Migrated { languages });
    }

    let facts = analyze(&normalized_code, normalize_opts)
        .map_err(|e| PoolError::migration_failed(hash, format!("canonical code analysis failed: {e}")))?;
    let mut metadata = ObjectMetadata::now(author)?;
    metadata.dependencies = facts.pool_hashes.into_iter().collect();

    for (language, table) in record.languages {
        let mapping = table.into_mapping();
        let request = SaveRequest {
            function_hash: hash.to_string(),
            language: language.clone(),
            normalized_code: normalized_code.clone(),
            docstring: mapping.docstring,
            name_mapping: mapping.name_mapping,
            alias_mapping: mapping.alias_mapping,
            comment: mapping.comment,
            metadata: metadata.clone(),
        };
        pool.save_function(request).map_err(|e| {
            PoolError::migration_failed(hash, format!("mapping write for {language:?} failed: {e}"))
        })?;
    }

    validate_function(pool, hash, normalize_opts)
        .map_err(|e| PoolError::migration_failed(hash, format!("v1 validation failed: {e}")))?;

    if !opts.keep_v0 {
        let backup = v0_path.with_extension("json.bak");
        std::fs::rename(&v0_path, &backup).map_err(|e| PoolError::io(&v0_path, e))?;
        info!(hash, backup = %backup.display(), "v0 record moved aside");
    }

    Ok(MigrateOutcome::Migrated { languages })
}

/// Whether the v1 tree already covers every language of the v0 record.
fn already_complete(
    pool: &Pool,
    hash: &str,
    languages: &indexmap::IndexMap<String, glossa_core::model::V0Language>,
) -> PoolResult<bool> {
    if !pool.layout().object_path(hash)?.exists() {
        return Ok(false);
    }
    for language in languages.keys() {
        match pool.mappings(hash, language) {
            Ok(list) if !list.is_empty() => {}
            Ok(_) => return Ok(false),
            Err(PoolError::LanguageNotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Migrate every v0 record in the pool.
pub fn migrate_all(
    pool: &Pool,
    author: &str,
    opts: &MigrateOptions,
    normalize_opts: &NormalizeOptions,
) -> PoolResult<MigrateReport> {
    let mut report = MigrateReport::default();
    for hash in pool.list_v0()? {
        match migrate_v0_to_v1(pool, &hash, author, opts, normalize_opts) {
            Ok(MigrateOutcome::Migrated { .. }) => report.migrated += 1,
            Ok(MigrateOutcome::AlreadyMigrated) => report.skipped += 1,
            Err(e) => {
                warn!(hash = %hash, error = %e, "migration failed, v0 record left untouched");
                report.failed += 1;
                report.failures.push(MigrateFailure { hash, reason: e.to_string() });
            }
        }
    }
    Ok(report)
}
