use std::fs;

use glossa_core::hash::{function_hash, validate_language_code};
use glossa_core::model::ObjectMetadata;
use glossa_core::normalize::{normalize, NormalizeOptions};
use glossa_store::{Pool, SaveRequest};

use crate::commands::split_target;
use crate::error::{CliError, CliResult};

/// `add <path>@<lang>`: parse, normalize, persist object and mapping,
/// print both hashes.
pub fn run(
    pool: &Pool,
    opts: &NormalizeOptions,
    author: &str,
    target: &str,
    comment: Option<&str>,
    tags: Vec<String>,
) -> CliResult<()> {
    let (path, language) = split_target(target)?;
    validate_language_code(language)?;

    let source = fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    let result = normalize(&source, opts)?;
    let hash = function_hash(&result.normalized_code_no_docstring);

    let mut metadata = ObjectMetadata::now(author)?.with_tags(tags);
    metadata.dependencies = result.dependencies.clone();

    let receipt = pool.save_function(SaveRequest {
        function_hash: hash,
        language: language.to_string(),
        normalized_code: result.normalized_code,
        docstring: result.docstring,
        name_mapping: result.name_mapping,
        alias_mapping: result.alias_mapping,
        comment: comment.unwrap_or_default().to_string(),
        metadata,
    })?;

    println!("{} {}", receipt.function_hash, receipt.mapping_hash);
    Ok(())
}
