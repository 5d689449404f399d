//! The v1 storage engine: write path, read path, deduplication, and
//! schema dispatch.
//!
//! Every file is published atomically: bytes go to a temporary file in
//! the target directory (suffixed with the process id so two writers
//! never share one), then rename over the target. Readers observe either
//! the old state or the new state, never a partial file. Two processes
//! that compute the same identity produce byte-identical content, so
//! whichever rename wins is correct.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use glossa_core::errors::{PoolError, PoolResult};
use glossa_core::hash::{mapping_hash, validate_hash};
use glossa_core::model::{FunctionObject, HashAlgorithm, MappingRecord, ObjectMetadata, V0Record};
use glossa_core::SCHEMA_VERSION;
use indexmap::IndexMap;

use crate::layout::{PoolLayout, MAPPING_FILE, OBJECT_FILE};

/// Which schema a stored function uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V0,
}

/// Everything `save_function` needs; the boundary fills in metadata.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub function_hash: String,
    pub language: String,
    /// Canonical source with the placeholder docstring.
    pub normalized_code: String,
    pub docstring: String,
    pub name_mapping: IndexMap<String, String>,
    pub alias_mapping: IndexMap<String, String>,
    pub comment: String,
    pub metadata: ObjectMetadata,
}

/// What a write actually did.
#[derive(Debug, Clone)]
pub struct SaveReceipt {
    pub function_hash: String,
    pub mapping_hash: String,
    pub object_created: bool,
    pub mapping_created: bool,
}

pub struct Pool {
    layout: PoolLayout,
}

impl Pool {
    /// Open (and create if needed) a pool rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> PoolResult<Self> {
        let layout = PoolLayout::new(root.as_ref().to_path_buf());
        let objects = layout.objects_dir();
        fs::create_dir_all(&objects).map_err(|e| PoolError::io(&objects, e))?;
        Ok(Self { layout })
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &PoolLayout {
        &self.layout
    }

    // ── write path ──────────────────────────────────────────────────────

    /// Persist an object (if new) and one language mapping (if new).
    /// Re-adding never overwrites: object metadata is immutable and a
    /// content-identical mapping is a no-op.
    pub fn save_function(&self, req: SaveRequest) -> PoolResult<SaveReceipt> {
        let record = MappingRecord {
            docstring: req.docstring,
            name_mapping: req.name_mapping,
            alias_mapping: req.alias_mapping,
            comment: req.comment,
        };
        let mapping_hash = mapping_hash(&record)?;

        let object_path = self.layout.object_path(&req.function_hash)?;
        let object_created = if object_path.exists() {
            false
        } else {
            let object = FunctionObject {
                schema_version: SCHEMA_VERSION,
                hash: req.function_hash.clone(),
                hash_algorithm: HashAlgorithm::Sha256,
                normalized_code: req.normalized_code,
                metadata: req.metadata,
            };
            self.write_json_atomic(&object_path, &object)?;
            debug!(hash = %req.function_hash, "object created");
            true
        };

        let mapping_path =
            self.layout.mapping_path(&req.function_hash, &req.language, &mapping_hash)?;
        let mapping_created = if mapping_path.exists() {
            let existing: MappingRecord = self.read_json(&mapping_path)?;
            if glossa_core::hash::mapping_hash(&existing)? != mapping_hash {
                return Err(PoolError::corruption(
                    &mapping_path,
                    "existing mapping content does not match its path",
                ));
            }
            false
        } else {
            self.write_json_atomic(&mapping_path, &record)?;
            debug!(
                hash = %req.function_hash,
                language = %req.language,
                mapping = %mapping_hash,
                "mapping created"
            );
            true
        };

        Ok(SaveReceipt {
            function_hash: req.function_hash,
            mapping_hash,
            object_created,
            mapping_created,
        })
    }

    // ── read path ───────────────────────────────────────────────────────

    pub fn load_function(&self, hash: &str) -> PoolResult<FunctionObject> {
        let path = self.layout.object_path(hash)?;
        if !path.exists() {
            return Err(PoolError::function_not_found(hash));
        }
        let object: FunctionObject = self.read_json(&path)?;
        if object.hash != hash {
            return Err(PoolError::corruption(
                &path,
                format!("object hash {} does not match its directory", object.hash),
            ));
        }
        if object.schema_version != SCHEMA_VERSION {
            return Err(PoolError::corruption(
                &path,
                format!("unexpected schema_version {}", object.schema_version),
            ));
        }
        Ok(object)
    }

    /// Language codes with at least one variant, sorted.
    pub fn languages(&self, hash: &str) -> PoolResult<Vec<String>> {
        let dir = self.layout.function_dir(hash)?;
        if !dir.exists() {
            return Err(PoolError::function_not_found(hash));
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| PoolError::io(&dir, e))? {
            let entry = entry.map_err(|e| PoolError::io(&dir, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if glossa_core::hash::validate_language_code(&name).is_ok() {
                out.push(name);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Mapping hashes stored under `hash/<language>/`, sorted.
    pub fn mappings(&self, hash: &str, language: &str) -> PoolResult<Vec<String>> {
        let dir = self.layout.language_dir(hash, language)?;
        if !dir.exists() {
            if !self.layout.function_dir(hash)?.exists() {
                return Err(PoolError::function_not_found(hash));
            }
            return Err(PoolError::language_not_found(hash, language));
        }
        let mut out = Vec::new();
        for shard in fs::read_dir(&dir).map_err(|e| PoolError::io(&dir, e))? {
            let shard = shard.map_err(|e| PoolError::io(&dir, e))?;
            if !shard.path().is_dir() {
                continue;
            }
            let prefix = shard.file_name().to_string_lossy().into_owned();
            for rest in fs::read_dir(shard.path()).map_err(|e| PoolError::io(shard.path(), e))? {
                let rest = rest.map_err(|e| PoolError::io(shard.path(), e))?;
                let tail = rest.file_name().to_string_lossy().into_owned();
                let candidate = format!("{prefix}{tail}");
                if validate_hash(&candidate).is_ok() && rest.path().join(MAPPING_FILE).exists() {
                    out.push(candidate);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn load_mapping(
        &self,
        hash: &str,
        language: &str,
        mapping_hash: &str,
    ) -> PoolResult<MappingRecord> {
        let path = self.layout.mapping_path(hash, language, mapping_hash)?;
        if !path.exists() {
            return Err(PoolError::mapping_not_found(hash, language, mapping_hash));
        }
        self.read_json(&path)
    }

    /// The mapping with the latest modification time; ties go to the
    /// lexicographically larger mapping hash.
    pub fn latest_mapping(&self, hash: &str, language: &str) -> PoolResult<(String, MappingRecord)> {
        let candidates = self.mappings(hash, language)?;
        let mut best: Option<(SystemTime, String)> = None;
        for m in candidates {
            let path = self.layout.mapping_path(hash, language, &m)?;
            let meta = fs::metadata(&path).map_err(|e| PoolError::io(&path, e))?;
            let mtime = meta.modified().map_err(|e| PoolError::io(&path, e))?;
            let better = match &best {
                None => true,
                Some((t, h)) => mtime > *t || (mtime == *t && m > *h),
            };
            if better {
                best = Some((mtime, m));
            }
        }
        match best {
            Some((_, m)) => {
                let record = self.load_mapping(hash, language, &m)?;
                Ok((m, record))
            }
            None => Err(PoolError::language_not_found(hash, language)),
        }
    }

    // ── schema dispatch ─────────────────────────────────────────────────

    /// v1 if the function directory exists, v0 if the legacy file does,
    /// otherwise *FunctionNotFound*. Reads never convert silently.
    pub fn detect_version(&self, hash: &str) -> PoolResult<SchemaVersion> {
        if self.layout.object_path(hash)?.exists() {
            return Ok(SchemaVersion::V1);
        }
        if self.layout.v0_path(hash)?.exists() {
            return Ok(SchemaVersion::V0);
        }
        Err(PoolError::function_not_found(hash))
    }

    pub fn load_v0(&self, hash: &str) -> PoolResult<V0Record> {
        let path = self.layout.v0_path(hash)?;
        if !path.exists() {
            return Err(PoolError::function_not_found(hash));
        }
        let record: V0Record = self.read_json(&path)?;
        if record.hash != hash {
            return Err(PoolError::corruption(
                &path,
                format!("v0 record hash {} does not match its file name", record.hash),
            ));
        }
        Ok(record)
    }

    // ── enumeration ─────────────────────────────────────────────────────

    /// All v1 function hashes in the pool, sorted.
    pub fn list_functions(&self) -> PoolResult<Vec<String>> {
        let mut out = Vec::new();
        for (hash, is_dir) in self.scan_objects()? {
            if is_dir {
                out.push(hash);
            }
        }
        out.sort();
        Ok(out)
    }

    /// All legacy v0 record hashes in the pool, sorted.
    pub fn list_v0(&self) -> PoolResult<Vec<String>> {
        let mut out = Vec::new();
        for (hash, is_dir) in self.scan_objects()? {
            if !is_dir {
                out.push(hash);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Resolve a unique hash prefix (>= 4 hex chars) to a full hash,
    /// searching v1 directories and v0 records alike.
    pub fn resolve_prefix(&self, prefix: &str) -> PoolResult<String> {
        if prefix.len() == 64 {
            validate_hash(prefix)?;
            return Ok(prefix.to_string());
        }
        if prefix.len() < 4
            || prefix.len() > 64
            || !prefix.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(PoolError::invalid_hash_format(prefix));
        }
        let mut matches: Vec<String> = self
            .scan_objects()?
            .into_iter()
            .map(|(hash, _)| hash)
            .filter(|h| h.starts_with(prefix))
            .collect();
        matches.sort();
        matches.dedup();
        match matches.len() {
            0 => Err(PoolError::function_not_found(prefix)),
            1 => Ok(matches.remove(0)),
            _ => Err(PoolError::AmbiguousHashPrefix { prefix: prefix.to_string(), matches }),
        }
    }

    /// One walk over `objects/`: `(hash, is_v1_directory)` pairs.
    fn scan_objects(&self) -> PoolResult<Vec<(String, bool)>> {
        let objects = self.layout.objects_dir();
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&objects).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&objects).to_path_buf();
                match e.into_io_error() {
                    Some(io) => PoolError::io(&path, io),
                    None => PoolError::corruption(&path, "unreadable pool entry"),
                }
            })?;
            let shard = match entry.path().parent().and_then(|p| p.file_name()) {
                Some(s) => s.to_string_lossy().into_owned(),
                None => continue,
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().is_dir() {
                let hash = format!("{shard}{name}");
                if validate_hash(&hash).is_ok() && entry.path().join(OBJECT_FILE).exists() {
                    out.push((hash, true));
                }
            } else if let Some(stem) = name.strip_suffix(".json") {
                let hash = format!("{shard}{stem}");
                if validate_hash(&hash).is_ok() {
                    out.push((hash, false));
                }
            }
        }
        Ok(out)
    }

    // ── file primitives ─────────────────────────────────────────────────

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> PoolResult<T> {
        let raw = fs::read(path).map_err(|e| PoolError::io(path, e))?;
        serde_json::from_slice(&raw)
            .map_err(|e| PoolError::corruption(path, format!("malformed json: {e}")))
    }

    fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> PoolResult<()> {
        let mut bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| PoolError::serialization(format!("encoding {} failed: {e}", path.display())))?;
        bytes.push(b'\n');
        write_atomic(path, &bytes)
    }
}

/// Write bytes to a same-directory temp file, fsync, then rename over the
/// target. A crash leaves either the old file or the new one, never a
/// partial write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> PoolResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| PoolError::invariant(format!("no parent for {}", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| PoolError::io(parent, e))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| PoolError::invariant(format!("no file name in {}", path.display())))?
        .to_string_lossy();
    let tmp = parent.join(format!(".{file_name}.tmp.{}", std::process::id()));

    {
        let mut f = fs::File::create(&tmp).map_err(|e| PoolError::io(&tmp, e))?;
        f.write_all(bytes).map_err(|e| PoolError::io(&tmp, e))?;
        f.sync_all().map_err(|e| PoolError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| PoolError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glossa_core::hash::function_hash;
    use glossa_core::normalize::{normalize, NormalizeOptions};
    use tempfile::TempDir;

    fn request(source: &str, language: &str, comment: &str) -> SaveRequest {
        let r = normalize(source, &NormalizeOptions::default()).unwrap();
        SaveRequest {
            function_hash: function_hash(&r.normalized_code_no_docstring),
            language: language.to_string(),
            normalized_code: r.normalized_code.clone(),
            docstring: r.docstring.clone(),
            name_mapping: r.name_mapping.clone(),
            alias_mapping: r.alias_mapping.clone(),
            comment: comment.to_string(),
            metadata: ObjectMetadata::now("tester").unwrap(),
        }
    }

    const EN: &str = "def sum_list(items):\n    \"\"\"Sum a list\"\"\"\n    total = 0\n    for item in items:\n        total += item\n    return total\n";
    const FR: &str = "def somme_liste(elements):\n    \"\"\"Somme d'une liste\"\"\"\n    total = 0\n    for element in elements:\n        total += element\n    return total\n";
    const ES: &str = "def suma_lista(elementos):\n    \"\"\"Suma una lista\"\"\"\n    total = 0\n    for elemento in elementos:\n        total += elemento\n    return total\n";

    #[test]
    fn save_and_load_roundtrip() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();

        let req = request(EN, "en", "");
        let receipt = pool.save_function(req.clone()).unwrap();
        assert!(receipt.object_created);
        assert!(receipt.mapping_created);

        let object = pool.load_function(&receipt.function_hash).unwrap();
        assert_eq!(object.hash, receipt.function_hash);
        assert_eq!(object.metadata.author, "tester");

        let record = pool
            .load_mapping(&receipt.function_hash, "en", &receipt.mapping_hash)
            .unwrap();
        assert_eq!(record.name_mapping["_glossa_v_0"], "sum_list");
    }

    #[test]
    fn duplicate_mapping_is_a_noop() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();

        let first = pool.save_function(request(EN, "en", "")).unwrap();
        let second = pool.save_function(request(EN, "en", "")).unwrap();
        assert_eq!(first.mapping_hash, second.mapping_hash);
        assert!(!second.object_created);
        assert!(!second.mapping_created);

        assert_eq!(pool.mappings(&first.function_hash, "en").unwrap().len(), 1);
    }

    #[test]
    fn three_languages_one_object() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();

        let a = pool.save_function(request(EN, "en", "")).unwrap();
        let b = pool.save_function(request(FR, "fr", "")).unwrap();
        let c = pool.save_function(request(ES, "es", "")).unwrap();

        assert_eq!(a.function_hash, b.function_hash);
        assert_eq!(b.function_hash, c.function_hash);
        assert_ne!(a.mapping_hash, b.mapping_hash);

        let langs = pool.languages(&a.function_hash).unwrap();
        assert_eq!(langs, vec!["en", "es", "fr"]);
    }

    #[test]
    fn comment_makes_a_second_variant() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();

        let formal = pool.save_function(request(EN, "en", "formal")).unwrap();
        let casual = pool.save_function(request(EN, "en", "casual")).unwrap();
        assert_ne!(formal.mapping_hash, casual.mapping_hash);

        let variants = pool.mappings(&formal.function_hash, "en").unwrap();
        assert_eq!(variants.len(), 2);
    }

    #[test]
    fn latest_mapping_prefers_newer_then_larger_hash() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();

        let a = pool.save_function(request(EN, "en", "first")).unwrap();
        let b = pool.save_function(request(EN, "en", "second")).unwrap();

        // Force equal mtimes so the lexicographic tie-break decides.
        let pa = pool.layout().mapping_path(&a.function_hash, "en", &a.mapping_hash).unwrap();
        let pb = pool.layout().mapping_path(&b.function_hash, "en", &b.mapping_hash).unwrap();
        let now = std::time::SystemTime::now();
        for p in [&pa, &pb] {
            let f = fs::OpenOptions::new().append(true).open(p).unwrap();
            f.set_modified(now).unwrap();
        }

        let (chosen, _) = pool.latest_mapping(&a.function_hash, "en").unwrap();
        assert_eq!(chosen, std::cmp::max(a.mapping_hash, b.mapping_hash));
    }

    #[test]
    fn missing_things_surface_typed_errors() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();
        let h = "9".repeat(64);

        assert!(matches!(pool.load_function(&h), Err(PoolError::FunctionNotFound { .. })));
        assert!(matches!(pool.detect_version(&h), Err(PoolError::FunctionNotFound { .. })));

        let saved = pool.save_function(request(EN, "en", "")).unwrap();
        assert!(matches!(
            pool.mappings(&saved.function_hash, "fr"),
            Err(PoolError::LanguageNotFound { .. })
        ));
        assert!(matches!(
            pool.load_mapping(&saved.function_hash, "en", &"0".repeat(64)),
            Err(PoolError::MappingNotFound { .. })
        ));
    }

    #[test]
    fn corruption_detected_on_hash_mismatch() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();

        let saved = pool.save_function(request(EN, "en", "")).unwrap();
        let path = pool.layout().object_path(&saved.function_hash).unwrap();
        let mut object: FunctionObject =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        object.hash = "0".repeat(64);
        fs::write(&path, serde_json::to_vec_pretty(&object).unwrap()).unwrap();

        assert!(matches!(
            pool.load_function(&saved.function_hash),
            Err(PoolError::Corruption { .. })
        ));
    }

    #[test]
    fn stray_tmp_file_never_breaks_reads() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();

        let saved = pool.save_function(request(EN, "en", "")).unwrap();
        // Simulate a crash between temp creation and rename.
        let dir = pool.layout().function_dir(&saved.function_hash).unwrap();
        fs::write(dir.join(".object.json.tmp.4242"), b"{ partial").unwrap();

        assert!(pool.load_function(&saved.function_hash).is_ok());
        assert_eq!(pool.languages(&saved.function_hash).unwrap(), vec!["en"]);
        assert_eq!(pool.list_functions().unwrap().len(), 1);
    }

    #[test]
    fn detect_version_dispatches() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();

        let saved = pool.save_function(request(EN, "en", "")).unwrap();
        assert_eq!(pool.detect_version(&saved.function_hash).unwrap(), SchemaVersion::V1);

        let h = "7".repeat(64);
        let v0 = V0Record {
            hash: h.clone(),
            normalized_code: "def _glossa_v_0():\n    pass\n".into(),
            languages: IndexMap::new(),
        };
        let path = pool.layout().v0_path(&h).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, serde_json::to_vec_pretty(&v0).unwrap()).unwrap();

        assert_eq!(pool.detect_version(&h).unwrap(), SchemaVersion::V0);
        assert_eq!(pool.load_v0(&h).unwrap().hash, h);
        assert_eq!(pool.list_v0().unwrap(), vec![h]);
    }

    #[test]
    fn prefix_resolution() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();

        let saved = pool.save_function(request(EN, "en", "")).unwrap();
        let prefix = &saved.function_hash[..8];
        assert_eq!(pool.resolve_prefix(prefix).unwrap(), saved.function_hash);

        assert!(matches!(
            pool.resolve_prefix("zzzz"),
            Err(PoolError::InvalidHashFormat { .. })
        ));
        assert!(matches!(
            pool.resolve_prefix("ab"),
            Err(PoolError::InvalidHashFormat { .. })
        ));
    }
}
