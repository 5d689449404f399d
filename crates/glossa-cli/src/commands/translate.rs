use std::collections::BTreeMap;

use glossa_core::hash::validate_language_code;
use glossa_core::model::ObjectMetadata;
use glossa_store::{Pool, SaveRequest, SchemaVersion};

use crate::commands::split_target;
use crate::error::{CliError, CliResult};

/// `translate <hash>@<src> <dst>`: start from the source-language
/// mapping, apply `--rename OLD=NEW` pairs and an optional docstring,
/// and persist the result as a new variant of the destination language.
#[allow(clippy::too_many_arguments)]
pub fn run(
    pool: &Pool,
    author: &str,
    source: &str,
    dst_language: &str,
    renames: &[String],
    docstring: Option<&str>,
    comment: Option<&str>,
    mapping: Option<&str>,
) -> CliResult<()> {
    let (prefix, src_language) = split_target(source)?;
    validate_language_code(dst_language)?;
    let hash = pool.resolve_prefix(prefix)?;

    if pool.detect_version(&hash)? == SchemaVersion::V0 {
        return Err(CliError::usage(format!(
            "{hash} is a legacy v0 record; run migrate before translating"
        )));
    }

    let object = pool.load_function(&hash)?;
    let src_mapping = match mapping {
        Some(m) => pool.load_mapping(&hash, src_language, m)?,
        None => pool.latest_mapping(&hash, src_language)?.1,
    };

    let table = parse_renames(renames)?;
    let mut unused: BTreeMap<&str, ()> = table.keys().map(|k| (k.as_str(), ())).collect();

    let mut name_mapping = src_mapping.name_mapping.clone();
    for original in name_mapping.values_mut() {
        if let Some(new) = table.get(original.as_str()) {
            unused.remove(original.as_str());
            *original = new.clone();
        }
    }
    let mut alias_mapping = src_mapping.alias_mapping.clone();
    for alias in alias_mapping.values_mut() {
        if let Some(new) = table.get(alias.as_str()) {
            unused.remove(alias.as_str());
            *alias = new.clone();
        }
    }
    if !unused.is_empty() {
        let names: Vec<&str> = unused.keys().copied().collect();
        return Err(CliError::usage(format!(
            "--rename names not present in the source mapping: {}",
            names.join(", ")
        )));
    }

    let receipt = pool.save_function(SaveRequest {
        function_hash: hash,
        language: dst_language.to_string(),
        normalized_code: object.normalized_code,
        docstring: docstring.unwrap_or(&src_mapping.docstring).to_string(),
        name_mapping,
        alias_mapping,
        comment: comment.unwrap_or_default().to_string(),
        metadata: ObjectMetadata::now(author)?,
    })?;

    println!("{} {}", receipt.function_hash, receipt.mapping_hash);
    Ok(())
}

fn parse_renames(renames: &[String]) -> CliResult<BTreeMap<String, String>> {
    let mut table = BTreeMap::new();
    for pair in renames {
        match pair.split_once('=') {
            Some((old, new)) if !old.is_empty() && !new.is_empty() => {
                table.insert(old.to_string(), new.to_string());
            }
            _ => {
                return Err(CliError::usage(format!(
                    "expected --rename OLD=NEW, got {pair:?}"
                )))
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_pairs_parse() {
        let t = parse_renames(&["total=totale".into(), "item=objet".into()]).unwrap();
        assert_eq!(t["total"], "totale");
        assert_eq!(t["item"], "objet");
        assert!(parse_renames(&["broken".into()]).is_err());
        assert!(parse_renames(&["=x".into()]).is_err());
    }
}
