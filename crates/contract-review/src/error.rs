//! Error types for contract-review.
//!
//! This module defines all error types used throughout the crate, along with
//! the mapping from each error to the HTTP status the API answers with.

use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

/// The main error type for contract-review operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Domain Errors ===
    /// A record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record, e.g. `contract`.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A request carried invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The uploaded file has an extension we do not accept.
    #[error("unsupported file type '{extension}', allowed: {allowed}")]
    UnsupportedFileType {
        /// The rejected extension (may be empty).
        extension: String,
        /// Comma separated list of accepted extensions.
        allowed: String,
    },

    /// The uploaded file exceeds the size limit.
    #[error("file too large: {size} bytes, maximum is {max} bytes")]
    FileTooLarge {
        /// Size of the rejected file.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// The uploaded file name exceeds the length limit.
    #[error("file name too long: {len} bytes, maximum is {max}")]
    FileNameTooLong {
        /// Length of the rejected name.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    // === Conversion Errors ===
    /// The conversion backend rejected or failed the request.
    #[error("document conversion failed: {0}")]
    Conversion(String),

    /// No converter is able to handle the document.
    #[error("no converter available for {0} documents")]
    ConverterUnavailable(&'static str),

    /// An HTTP call to the conversion backend failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization failed. Request bodies are rejected by the
    /// extractor before they get here, so this is always a server fault.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An uploaded CSV could not be parsed. Failures writing CSV output
    /// are reported as [`Error::Internal`].
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for contract-review operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a new invalid-input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a new conversion error.
    #[must_use]
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error means the record was missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The HTTP status code the API answers with for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidInput(_)
            | Self::UnsupportedFileType { .. }
            | Self::FileNameTooLong { .. }
            | Self::Csv(_) => StatusCode::BAD_REQUEST,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Conversion(_) | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::ConverterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
