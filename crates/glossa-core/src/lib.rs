//! glossa-core
//!
//! Core primitives for the glossa function pool:
//! - Syntax toolkit for the stored source language (lexer, parser, unparser)
//! - AST normalizer and canonical-name allocator
//! - Denormalizer (canonical form + mapping -> author-visible code)
//! - Canonical JSON encoding for deterministic hashing
//! - Function and mapping identity hashes
//! - Wire models for `object.json`, `mapping.json`, and legacy v0 records
//!
//! This crate performs no filesystem or environment access; persistence
//! lives in `glossa-store`.

pub mod builtins;
pub mod canonical_json;
pub mod denormalize;
pub mod errors;
pub mod hash;
pub mod model;
pub mod normalize;
pub mod syntax;

pub use crate::errors::{PoolError, PoolResult};

/// Wire schema version written into every `object.json`.
pub const SCHEMA_VERSION: u32 = 1;

/// Fixed prefix for canonical identifiers. Chosen once for the whole
/// system; changing it changes every function hash in the pool.
pub const CANON_PREFIX: &str = "glossa";

/// Non-empty docstring sentinel embedded in `normalized_code`.
pub const DOCSTRING_PLACEHOLDER: &str = "__glossa_docstring__";

/// Default marker module path for pool imports
/// (`from pool.import import object_<hash> as alias`).
pub const DEFAULT_POOL_MODULE: &str = "pool.import";

/// Name prefix binding a pool-imported function inside source code.
pub const OBJECT_NAME_PREFIX: &str = "object_";

/// Canonical identifier for allocator index `n`, e.g. `_glossa_v_0`.
pub fn canonical_name(n: usize) -> String {
    format!("_{CANON_PREFIX}_v_{n}")
}

/// Whether `name` matches the canonical identifier template exactly.
pub fn is_canonical_name(name: &str) -> bool {
    canonical_index(name).is_some()
}

/// Parse the allocator index out of a canonical identifier.
pub fn canonical_index(name: &str) -> Option<usize> {
    let rest = name.strip_prefix('_')?.strip_prefix(CANON_PREFIX)?.strip_prefix("_v_")?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Reject non-canonical spellings like `_glossa_v_01`.
    if rest.len() > 1 && rest.starts_with('0') {
        return None;
    }
    rest.parse().ok()
}

/// Source-level name of a pool object, e.g. `object_<64 hex>`.
pub fn pool_object_name(hash: &str) -> String {
    format!("{OBJECT_NAME_PREFIX}{hash}")
}

/// Inverse of [`pool_object_name`]: extract the function hash if `name`
/// has the `object_<64 hex>` shape.
pub fn parse_pool_object_name(name: &str) -> Option<&str> {
    let hash = name.strip_prefix(OBJECT_NAME_PREFIX)?;
    if hash.len() == 64 && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        Some(hash)
    } else {
        None
    }
}
