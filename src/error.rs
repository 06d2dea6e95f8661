//! Error types for the exploration engine.
//!
//! All errors are local: nothing escapes into the listener surface. Loading
//! errors feed the derive-on-missing-data path, SQL and HTTP failures are
//! logged and retried (or tolerated) by their callers.

use thiserror::Error;

/// Errors that can occur in the exploration engine.
#[derive(Error, Debug)]
pub enum ExploreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pixel file error: {0}")]
    PixelFile(String),

    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No road features for region: {0}")]
    DeriveEmpty(String),
}

pub type Result<T> = std::result::Result<T, ExploreError>;
