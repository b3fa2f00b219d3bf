//! Error types for StrataKV
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StrataError
pub type Result<T> = std::result::Result<T, StrataError>;

/// Unified error type for StrataKV operations
#[derive(Debug, Error)]
pub enum StrataError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Data File Errors
    // -------------------------------------------------------------------------
    /// A line of an SSTable or WAL file that cannot be parsed
    #[error("Corrupt record in {} at line {line}: {reason}", path.display())]
    CorruptRecord {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// A sidecar filter that fails its checksum or does not decode
    #[error("Corrupt filter: {0}")]
    CorruptFilter(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Background Task Errors
    // -------------------------------------------------------------------------
    #[error("Background compaction error: {0}")]
    Background(String),
}
