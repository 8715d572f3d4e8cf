//! Error types for arenadb
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using ArenaError
pub type Result<T> = std::result::Result<T, ArenaError>;

/// Unified error type for arenadb operations
#[derive(Debug, Error)]
pub enum ArenaError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Record not found")]
    NotFound,

    #[error("Field {field} out of range (schema has {field_count} fields)")]
    OutOfRange { field: u8, field_count: u8 },

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Duplicate key in index of field {field}")]
    DuplicateKey { field: u8 },

    #[error("Field {field} already has an index")]
    IndexExists { field: u8 },

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Arena is full ({} records)", u32::MAX)]
    CapacityExceeded,

    #[error("Mapping is behind the file, refresh the handle")]
    StaleMapping,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// How an error should surface at the domain boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The requested record does not exist ("missing resource")
    Missing,

    /// The caller's input was refused; the store is unchanged
    Rejected,

    /// The store or its backing files failed ("internal error")
    Internal,
}

impl ArenaError {
    /// Classify this error for callers that translate it into a response
    pub fn class(&self) -> ErrorClass {
        match self {
            ArenaError::NotFound => ErrorClass::Missing,
            ArenaError::OutOfRange { .. }
            | ArenaError::DuplicateKey { .. }
            | ArenaError::IndexExists { .. }
            | ArenaError::InvalidInput(_)
            | ArenaError::CapacityExceeded => ErrorClass::Rejected,
            ArenaError::Io(_)
            | ArenaError::SchemaMismatch(_)
            | ArenaError::StaleMapping
            | ArenaError::Config(_) => ErrorClass::Internal,
        }
    }

    /// Shorthand for `class() == ErrorClass::Missing`
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArenaError::NotFound)
    }
}
