use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Required sheet '{expected}' not found in workbook (available: {available:?})")]
    MissingSheet {
        expected: String,
        available: Vec<String>,
    },

    #[error("Workbook could not be read: {0}")]
    UnreadableWorkbook(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {0} has no extracted metrics")]
    MissingMetrics(String),

    #[error("Invalid sector catalog: {0}")]
    InvalidCatalog(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
