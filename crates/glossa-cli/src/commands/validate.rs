use glossa_core::normalize::NormalizeOptions;
use glossa_store::{validate_all, validate_function, Pool};

use crate::error::CliResult;

/// `validate [<hash>]`.
pub fn run(pool: &Pool, opts: &NormalizeOptions, hash: Option<&str>) -> CliResult<()> {
    match hash {
        Some(prefix) => {
            let hash = pool.resolve_prefix(prefix)?;
            validate_function(pool, &hash, opts)?;
            println!("ok {hash}");
        }
        None => {
            let report = validate_all(pool, opts)?;
            println!("checked {} passed {}", report.checked, report.passed);
            for failure in &report.failures {
                eprintln!("invalid {}: {}", failure.hash, failure.reason);
            }
            if !report.failures.is_empty() {
                return Err(crate::error::CliError::usage(format!(
                    "{} object(s) failed validation",
                    report.failures.len()
                )));
            }
        }
    }
    Ok(())
}
