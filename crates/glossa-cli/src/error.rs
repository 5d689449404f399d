use std::path::PathBuf;

use glossa_core::PoolError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("{0}")]
    Usage(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CliError {
    pub fn usage<M: Into<String>>(message: M) -> Self {
        Self::Usage(message.into())
    }

    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

pub type CliResult<T> = Result<T, CliError>;
