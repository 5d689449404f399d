//! Deterministic pool layout.
//!
//! ```text
//! <root>/objects/h0h1/h2..h63/
//!     object.json
//!     <lang>/m0m1/m2..m63/mapping.json
//! <root>/objects/h0h1/h2..h63.json        (legacy v0 record)
//! ```
//!
//! The 2-character shard prefix spreads directories across a large pool.
//! Hex names are lowercase only; mixed case is rejected before any path
//! is built, so a case-insensitive filesystem can never make two
//! identities collide.

use std::path::{Path, PathBuf};

use glossa_core::hash::{validate_hash, validate_language_code};
use glossa_core::PoolResult;

pub const OBJECT_FILE: &str = "object.json";
pub const MAPPING_FILE: &str = "mapping.json";

#[derive(Debug, Clone)]
pub struct PoolLayout {
    root: PathBuf,
}

impl PoolLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    pub fn function_dir(&self, hash: &str) -> PoolResult<PathBuf> {
        validate_hash(hash)?;
        Ok(self.objects_dir().join(&hash[..2]).join(&hash[2..]))
    }

    pub fn object_path(&self, hash: &str) -> PoolResult<PathBuf> {
        Ok(self.function_dir(hash)?.join(OBJECT_FILE))
    }

    /// Path of the legacy single-file record: `objects/h0h1/h2..h63.json`.
    pub fn v0_path(&self, hash: &str) -> PoolResult<PathBuf> {
        validate_hash(hash)?;
        Ok(self.objects_dir().join(&hash[..2]).join(format!("{}.json", &hash[2..])))
    }

    pub fn language_dir(&self, hash: &str, language: &str) -> PoolResult<PathBuf> {
        validate_language_code(language)?;
        Ok(self.function_dir(hash)?.join(language))
    }

    pub fn mapping_dir(&self, hash: &str, language: &str, mapping_hash: &str) -> PoolResult<PathBuf> {
        validate_hash(mapping_hash)?;
        Ok(self
            .language_dir(hash, language)?
            .join(&mapping_hash[..2])
            .join(&mapping_hash[2..]))
    }

    pub fn mapping_path(&self, hash: &str, language: &str, mapping_hash: &str) -> PoolResult<PathBuf> {
        Ok(self.mapping_dir(hash, language, mapping_hash)?.join(MAPPING_FILE))
    }
}
