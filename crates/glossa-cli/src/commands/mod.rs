//! Command implementations. Each command maps CLI arguments onto core
//! calls and prints data to stdout; errors bubble up as `CliError`.

pub mod add;
pub mod get;
pub mod migrate;
pub mod show;
pub mod translate;
pub mod validate;

use crate::error::{CliError, CliResult};

/// Split `target@lang` at the last `@`.
pub fn split_target(target: &str) -> CliResult<(&str, &str)> {
    match target.rsplit_once('@') {
        Some((left, lang)) if !left.is_empty() && !lang.is_empty() => Ok((left, lang)),
        _ => Err(CliError::usage(format!(
            "expected <target>@<language>, got {target:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_target_uses_last_at() {
        assert_eq!(split_target("path/f.py@fr").unwrap(), ("path/f.py", "fr"));
        assert_eq!(split_target("we@ird/f.py@fr").unwrap(), ("we@ird/f.py", "fr"));
        assert!(split_target("nolang").is_err());
        assert!(split_target("@fr").is_err());
        assert!(split_target("x@").is_err());
    }
}
