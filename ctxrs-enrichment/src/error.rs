use ctxrs_core::Cancelled;
use ctxrs_rankings::RankingStoreError;
use thiserror::Error;

/// Failure of one enrichment run. In a batch, each input fails on its own.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    /// No usable region is left once regions absent from the database are dropped.
    #[error("Region set '{0}' has no regions in the ranking database universe")]
    EmptyRegionSet(String),

    #[error("Invalid enrichment parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Store(RankingStoreError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl From<RankingStoreError> for EnrichmentError {
    fn from(err: RankingStoreError) -> Self {
        match err {
            RankingStoreError::Cancelled(cancelled) => EnrichmentError::Cancelled(cancelled),
            other => EnrichmentError::Store(other),
        }
    }
}

impl EnrichmentError {
    /// Whether this failure invalidates the whole run rather than one input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EnrichmentError::Store(RankingStoreError::CorruptStore { .. })
                | EnrichmentError::Cancelled(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EnrichmentError>;
