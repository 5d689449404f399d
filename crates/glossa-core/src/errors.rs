//! Error types for the glossa core.
//!
//! Every core operation either returns a well-formed result or a single
//! typed failure naming its category and the offending entity (path, hash,
//! language, or source span). Nothing is retried and nothing is swallowed.

use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

/// Result type used throughout glossa-core and glossa-store.
pub type PoolResult<T> = Result<T, PoolError>;

/// Top-level error type for the pool core.
#[derive(Debug)]
pub enum PoolError {
    /// The source does not parse.
    MalformedInput {
        message: String,
        line: usize,
        column: usize,
    },

    /// The module does not contain exactly one function definition.
    MultipleDefinitions {
        count: usize,
    },

    /// A construct the normalizer cannot canonicalize yet.
    UnsupportedConstruct {
        construct: String,
        line: usize,
        column: usize,
    },

    /// Language code outside `[A-Za-z0-9_-]{1,256}`.
    InvalidLanguageCode {
        code: String,
    },

    /// Hash that is not 64 lowercase hex characters.
    InvalidHashFormat {
        value: String,
    },

    /// A hash prefix matching more than one function in the pool.
    AmbiguousHashPrefix {
        prefix: String,
        matches: Vec<String>,
    },

    /// No object (v1 or v0) stored under this hash.
    FunctionNotFound {
        hash: String,
    },

    /// The object exists but has no variant in this language.
    LanguageNotFound {
        hash: String,
        language: String,
    },

    /// No mapping with this hash under the given language.
    MappingNotFound {
        hash: String,
        language: String,
        mapping: String,
    },

    /// A canonical identifier with no entry in the chosen mapping.
    MappingIncomplete {
        canonical: String,
    },

    /// On-disk state violating a pool invariant. Never auto-repaired.
    Corruption {
        path: PathBuf,
        message: String,
    },

    /// Underlying filesystem failure.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON encode/decode failure.
    Serialization {
        message: String,
    },

    /// Migration failure; the v0 file is left untouched.
    MigrationFailed {
        hash: String,
        message: String,
    },

    /// Internal invariant violation.
    Invariant {
        message: String,
    },
}

impl PoolError {
    pub fn malformed_input<M: Into<String>>(message: M, line: usize, column: usize) -> Self {
        Self::MalformedInput { message: message.into(), line, column }
    }

    pub fn multiple_definitions(count: usize) -> Self {
        Self::MultipleDefinitions { count }
    }

    pub fn unsupported<M: Into<String>>(construct: M, line: usize, column: usize) -> Self {
        Self::UnsupportedConstruct { construct: construct.into(), line, column }
    }

    pub fn invalid_language_code<M: Into<String>>(code: M) -> Self {
        Self::InvalidLanguageCode { code: code.into() }
    }

    pub fn invalid_hash_format<M: Into<String>>(value: M) -> Self {
        Self::InvalidHashFormat { value: value.into() }
    }

    pub fn function_not_found<M: Into<String>>(hash: M) -> Self {
        Self::FunctionNotFound { hash: hash.into() }
    }

    pub fn language_not_found<H: Into<String>, L: Into<String>>(hash: H, language: L) -> Self {
        Self::LanguageNotFound { hash: hash.into(), language: language.into() }
    }

    pub fn mapping_not_found<H, L, M>(hash: H, language: L, mapping: M) -> Self
    where
        H: Into<String>,
        L: Into<String>,
        M: Into<String>,
    {
        Self::MappingNotFound {
            hash: hash.into(),
            language: language.into(),
            mapping: mapping.into(),
        }
    }

    pub fn mapping_incomplete<M: Into<String>>(canonical: M) -> Self {
        Self::MappingIncomplete { canonical: canonical.into() }
    }

    pub fn corruption<P: AsRef<Path>, M: Into<String>>(path: P, message: M) -> Self {
        Self::Corruption { path: path.as_ref().to_path_buf(), message: message.into() }
    }

    pub fn io<P: AsRef<Path>>(path: P, source: std::io::Error) -> Self {
        Self::Io { path: path.as_ref().to_path_buf(), source }
    }

    pub fn serialization<M: Into<String>>(message: M) -> Self {
        Self::Serialization { message: message.into() }
    }

    pub fn migration_failed<H: Into<String>, M: Into<String>>(hash: H, message: M) -> Self {
        Self::MigrationFailed { hash: hash.into(), message: message.into() }
    }

    pub fn invariant<M: Into<String>>(message: M) -> Self {
        Self::Invariant { message: message.into() }
    }
}

impl Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedInput { message, line, column } => {
                write!(f, "malformed input at {line}:{column}: {message}")
            }
            Self::MultipleDefinitions { count } => {
                write!(f, "module must contain exactly one function definition, found {count}")
            }
            Self::UnsupportedConstruct { construct, line, column } => {
                write!(f, "unsupported construct at {line}:{column}: {construct}")
            }
            Self::InvalidLanguageCode { code } => {
                write!(f, "invalid language code: {code:?}")
            }
            Self::InvalidHashFormat { value } => {
                write!(f, "invalid hash: {value:?} (expected 64 lowercase hex characters)")
            }
            Self::AmbiguousHashPrefix { prefix, matches } => {
                write!(f, "hash prefix {prefix:?} is ambiguous ({} matches)", matches.len())
            }
            Self::FunctionNotFound { hash } => {
                write!(f, "function not found: {hash}")
            }
            Self::LanguageNotFound { hash, language } => {
                write!(f, "no {language:?} variant for function {hash}")
            }
            Self::MappingNotFound { hash, language, mapping } => {
                write!(f, "mapping {mapping} not found under {hash}/{language}")
            }
            Self::MappingIncomplete { canonical } => {
                write!(f, "mapping has no entry for canonical identifier {canonical}")
            }
            Self::Corruption { path, message } => {
                write!(f, "corruption at {}: {message}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "io error at {}: {source}", path.display())
            }
            Self::Serialization { message } => {
                write!(f, "serialization error: {message}")
            }
            Self::MigrationFailed { hash, message } => {
                write!(f, "migration of {hash} failed: {message}")
            }
            Self::Invariant { message } => {
                write!(f, "invariant violation: {message}")
            }
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_malformed_input() {
        let e = PoolError::malformed_input("unexpected token", 3, 7);
        assert_eq!(format!("{e}"), "malformed input at 3:7: unexpected token");
    }

    #[test]
    fn display_language_not_found() {
        let e = PoolError::language_not_found("ab".repeat(32), "fr");
        assert!(format!("{e}").contains("\"fr\""));
    }

    #[test]
    fn io_error_exposes_source() {
        use std::error::Error;
        let e = PoolError::io("/tmp/x", std::io::Error::other("boom"));
        assert!(e.source().is_some());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PoolError>();
    }
}
