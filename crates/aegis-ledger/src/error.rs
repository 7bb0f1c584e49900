use std::path::PathBuf;

use thiserror::Error;

/// Errors from the audit ledger.
///
/// Integrity failures are not errors; they are reported through
/// [`ChainVerification`](crate::ChainVerification) and
/// [`CheckpointVerification`](crate::CheckpointVerification).
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("cannot checkpoint an empty chain")]
    EmptyChain,
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }
}
