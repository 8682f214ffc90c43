use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Failed to read annotation table: {0}")]
    FileRead(String),

    #[error("Annotation table is missing the '{0}' column")]
    MissingColumn(String),

    #[error("Line {line}: unrecognized confidence tier '{value}'")]
    InvalidTier { line: usize, value: String },

    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnnotationError>;
