use glossa_store::{Pool, SchemaVersion};

use crate::error::CliResult;

/// `show <hash>`: object metadata, languages, and mapping variants.
pub fn run(pool: &Pool, prefix: &str) -> CliResult<()> {
    let hash = pool.resolve_prefix(prefix)?;

    match pool.detect_version(&hash)? {
        SchemaVersion::V1 => {
            let object = pool.load_function(&hash)?;
            println!("hash:     {}", object.hash);
            println!("schema:   v{}", object.schema_version);
            println!("created:  {}", object.metadata.created);
            println!("author:   {}", object.metadata.author);
            if !object.metadata.tags.is_empty() {
                println!("tags:     {}", object.metadata.tags.join(", "));
            }
            if !object.metadata.dependencies.is_empty() {
                println!("depends:");
                for dep in &object.metadata.dependencies {
                    println!("  {dep}");
                }
            }
            for language in pool.languages(&hash)? {
                println!("{language}:");
                for m in pool.mappings(&hash, &language)? {
                    let record = pool.load_mapping(&hash, &language, &m)?;
                    if record.comment.is_empty() {
                        println!("  {m}");
                    } else {
                        println!("  {m}  ({})", record.comment);
                    }
                }
            }
        }
        SchemaVersion::V0 => {
            let record = pool.load_v0(&hash)?;
            println!("hash:     {}", record.hash);
            println!("schema:   v0 (legacy, run migrate)");
            for language in record.languages.keys() {
                println!("{language}:");
            }
        }
    }
    Ok(())
}
