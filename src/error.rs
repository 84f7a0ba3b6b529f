use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for rowmark operations.
#[derive(Debug, Error)]
pub enum RowmarkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index not found: {location}")]
    IndexNotFound { location: String },

    #[error("Object not found: {key}")]
    ObjectNotFound { key: String },

    #[error("Storage error for {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode {context}: {source}")]
    Encode {
        context: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid partition: {message}")]
    InvalidPartition { message: String },

    #[error("Failed to parse detector config from {path}: {source}")]
    DetectorConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Ledger CSV error for {context}: {source}")]
    LedgerCsv {
        context: String,
        #[source]
        source: csv::Error,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl RowmarkError {
    /// Returns true for upstream failures worth retrying at the storage boundary.
    pub fn is_transient(&self) -> bool {
        match self {
            RowmarkError::Storage { source, .. } => matches!(
                source.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
