use glossa_core::normalize::NormalizeOptions;
use glossa_store::{migrate_all, migrate_v0_to_v1, MigrateOptions, MigrateOutcome, Pool};

use crate::error::CliResult;

/// `migrate [<hash>] [--dry-run] [--keep-v0]`.
pub fn run(
    pool: &Pool,
    opts: &NormalizeOptions,
    author: &str,
    hash: Option<&str>,
    migrate_opts: &MigrateOptions,
) -> CliResult<()> {
    match hash {
        Some(prefix) => {
            let hash = pool.resolve_prefix(prefix)?;
            match migrate_v0_to_v1(pool, &hash, author, migrate_opts, opts)? {
                MigrateOutcome::Migrated { languages } => {
                    println!("migrated {hash} ({})", languages.join(", "));
                }
                MigrateOutcome::AlreadyMigrated => {
                    println!("skipped {hash} (already v1)");
                }
            }
        }
        None => {
            let report = migrate_all(pool, author, migrate_opts, opts)?;
            println!(
                "migrated {} skipped {} failed {}",
                report.migrated, report.skipped, report.failed
            );
            for failure in &report.failures {
                eprintln!("failed {}: {}", failure.hash, failure.reason);
            }
            if report.failed > 0 {
                return Err(crate::error::CliError::usage(format!(
                    "{} record(s) failed to migrate",
                    report.failed
                )));
            }
        }
    }
    Ok(())
}
