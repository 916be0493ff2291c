//! Error types for the cordex library.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for cordex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Index building and loading errors.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Query-time errors.
    #[error("search error: {0}")]
    Search(#[from] SearchError),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur while building or loading index segments.
#[derive(Error, Debug)]
pub enum IndexError {
    /// No segments found under the index directory.
    #[error("no segments to load")]
    EmptyIndex,

    /// A segment file is missing or truncated beyond use.
    #[error("corrupt segment file {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    /// A document produced no indexable tokens.
    #[error("document {0} has no indexable tokens")]
    EmptyDocument(String),
}

/// Errors that occur during query evaluation.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Malformed request parameter.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The given cord_uid does not exist in the metadata table.
    #[error("unknown document: {0}")]
    UnknownDocument(String),
}

impl IndexError {
    /// Shorthand for a corruption error tied to a file.
    pub fn corrupt(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        IndexError::Corrupt {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// Result type for cordex operations.
pub type Result<T> = std::result::Result<T, Error>;
