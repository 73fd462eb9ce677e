use std::path::PathBuf;

use thiserror::Error;

use crate::audio::DecodeError;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Failed to stat {path:?}: {source}")]
    StatFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),

    /// A reconciliation key with no resolved row. Aborts the batch.
    #[error("Scan invariant violated: {0}")]
    Invariant(String),
}

pub type ScanResult<T> = Result<T, ScanError>;
