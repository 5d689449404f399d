use glossa_core::denormalize::denormalize;
use glossa_core::errors::PoolError;
use glossa_core::hash::validate_hash;
use glossa_core::normalize::{with_docstring, NormalizeOptions};
use glossa_core::DOCSTRING_PLACEHOLDER;
use glossa_store::{Pool, SchemaVersion};

use crate::commands::split_target;
use crate::error::CliResult;

/// `get <hash>@<lang>`: load object and chosen mapping, denormalize,
/// print the author-visible source. v1 is tried first, then v0.
pub fn run(
    pool: &Pool,
    opts: &NormalizeOptions,
    target: &str,
    mapping: Option<&str>,
) -> CliResult<()> {
    let (prefix, language) = split_target(target)?;
    let hash = pool.resolve_prefix(prefix)?;

    let code = match pool.detect_version(&hash)? {
        SchemaVersion::V1 => {
            let object = pool.load_function(&hash)?;
            let record = match mapping {
                Some(m) => {
                    validate_hash(m)?;
                    pool.load_mapping(&hash, language, m)?
                }
                None => pool.latest_mapping(&hash, language)?.1,
            };
            denormalize(&object.normalized_code, &record, opts)?
        }
        SchemaVersion::V0 => {
            let record = pool.load_v0(&hash)?;
            let table = record
                .languages
                .get(language)
                .cloned()
                .ok_or_else(|| PoolError::language_not_found(&hash, language))?;
            let sentinel =
                with_docstring(&record.normalized_code, Some(DOCSTRING_PLACEHOLDER))?;
            denormalize(&sentinel, &table.into_mapping(), opts)?
        }
    };

    print!("{code}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use glossa_core::hash::function_hash;
    use glossa_core::model::ObjectMetadata;
    use glossa_core::normalize::normalize;
    use glossa_store::SaveRequest;
    use tempfile::TempDir;

    fn seed(pool: &Pool) -> String {
        let src = "def double(n):\n    \"\"\"Twice n.\"\"\"\n    return n * 2\n";
        let r = normalize(src, &NormalizeOptions::default()).unwrap();
        pool.save_function(SaveRequest {
            function_hash: function_hash(&r.normalized_code_no_docstring),
            language: "en".into(),
            normalized_code: r.normalized_code.clone(),
            docstring: r.docstring.clone(),
            name_mapping: r.name_mapping.clone(),
            alias_mapping: r.alias_mapping.clone(),
            comment: String::new(),
            metadata: ObjectMetadata::now("tester").unwrap(),
        })
        .unwrap()
        .function_hash
    }

    #[test]
    fn get_by_prefix_and_latest_mapping() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();
        let hash = seed(&pool);
        let target = format!("{}@en", &hash[..8]);
        run(&pool, &NormalizeOptions::default(), &target, None).unwrap();
    }

    #[test]
    fn missing_language_surfaces_not_found() {
        let td = TempDir::new().unwrap();
        let pool = Pool::open(td.path()).unwrap();
        let hash = seed(&pool);
        let target = format!("{hash}@fr");
        let err = run(&pool, &NormalizeOptions::default(), &target, None).unwrap_err();
        assert!(matches!(err, CliError::Pool(PoolError::LanguageNotFound { .. })));
    }
}
