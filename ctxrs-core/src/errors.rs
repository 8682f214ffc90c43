use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegionSetError {
    #[error("Can't read file: {0}")]
    FileReadError(String),

    #[error("Error parsing region: {0}")]
    RegionParseError(String),

    #[error("Invalid coordinates for region {chr}:{start}-{end}: start must be smaller than end")]
    InvalidCoordinates { chr: String, start: u32, end: u32 },

    #[error("Region has an empty chromosome name")]
    EmptyChromosome,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Raised by [`crate::CancelToken::check`] once a run was aborted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancelled {
    #[error("operation cancelled by caller")]
    ByCaller,
    #[error("operation timed out")]
    TimedOut,
}
