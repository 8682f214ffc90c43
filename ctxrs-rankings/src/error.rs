use std::io;

use ctxrs_core::Cancelled;
use thiserror::Error;

/// Error type for ranking database operations.
#[derive(Error, Debug)]
pub enum RankingStoreError {
    /// A requested region is not part of the database region universe.
    #[error("Region {0} is not part of the ranking database universe")]
    MissingRegion(String),

    /// A requested motif is not part of the database.
    #[error("Motif {0} is not part of the ranking database")]
    MissingMotif(String),

    /// The file on disk does not match its own declared structure.
    #[error("Corrupt ranking database {path}: {reason}")]
    CorruptStore { path: String, reason: String },

    /// Input handed to the database writer is inconsistent.
    #[error("Invalid ranking database input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RankingStoreError {
    pub(crate) fn corrupt(path: &std::path::Path, reason: impl Into<String>) -> Self {
        RankingStoreError::CorruptStore {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for ranking database operations.
pub type Result<T> = std::result::Result<T, RankingStoreError>;
