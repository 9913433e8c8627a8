//! Error types for wasp core operations.
//!
//! This module defines well-structured error types using `thiserror` for
//! library-level errors, while the binary uses `anyhow` for convenient
//! top-level handling.
//!
//! The variants fall into three scopes, which decide how far a failure
//! propagates during ingestion:
//!
//! - **record-local**: the record is skipped, the stream continues
//! - **file-fatal**: the reader task for that one file stops
//! - **process-fatal**: only losing the directory watch itself

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using WaspError
pub type Result<T> = std::result::Result<T, WaspError>;

/// Core error types for wasp operations.
#[derive(Error, Debug)]
pub enum WaspError {
    // === Archive Reading Errors ===
    /// The archive file could not be found
    #[error("archive not found at {path}")]
    NotFound { path: PathBuf },

    /// The structured record stream could not be decoded
    #[error("corrupt record at byte {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    /// A record lacks a header its type requires
    #[error("record {record_id} is missing header {header}")]
    MissingHeader { record_id: String, header: String },

    // === Content Errors ===
    /// The embedded HTTP response could not be parsed
    #[error("invalid HTTP response: {reason}")]
    InvalidHttp { reason: String },

    /// The embedded HTTP response uses an unknown content encoding
    #[error("unsupported content encoding: {encoding}")]
    UnsupportedEncoding { encoding: String },

    /// HTML content or title could not be extracted
    #[error("extraction failed: {reason}")]
    ExtractionFailure { reason: String },

    // === Correlation Errors ===
    /// A request references a response that is not in the store
    #[error("no response or revisit found for concurrent record {concurrent_id}")]
    MissingCorrelation { concurrent_id: String },

    /// A search hit has no request inside the query's time window
    #[error("document {document_id} has no request in the time window")]
    NoMatchingRequest { document_id: String },

    /// Following revisit pointers did not reach a page
    #[error("revisit chain starting at {id} exceeds {depth} hops")]
    RevisitChainTooDeep { id: String, depth: usize },

    // === Snapshot Errors ===
    /// The snapshot file is missing
    #[error("snapshot not found at {path}")]
    SnapshotNotFound { path: PathBuf },

    /// The snapshot file exists but is corrupted or unreadable
    #[error("snapshot is corrupted: {reason}")]
    SnapshotCorrupted { reason: String },

    /// The snapshot format version doesn't match the current version
    #[error("snapshot version mismatch: found {found}, expected {expected}")]
    SnapshotVersionMismatch { found: u32, expected: u32 },

    // === Query Errors ===
    /// A time bound could not be parsed
    #[error("invalid time: {input}")]
    InvalidTime { input: String },

    // === Watch Errors ===
    /// The archive directory can no longer be watched
    #[error("watch error: {reason}")]
    WatchError { reason: String },

    // === Configuration Errors ===
    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl WaspError {
    /// Returns true if this error only affects the record being processed.
    ///
    /// Ingestion logs these and moves on to the next record.
    pub fn is_record_local(&self) -> bool {
        matches!(
            self,
            WaspError::MissingHeader { .. }
                | WaspError::InvalidHttp { .. }
                | WaspError::UnsupportedEncoding { .. }
                | WaspError::ExtractionFailure { .. }
                | WaspError::MissingCorrelation { .. }
                | WaspError::RevisitChainTooDeep { .. }
                | WaspError::InvalidTime { .. }
        )
    }

    /// Returns true if this error stops reading the current archive file.
    pub fn is_file_fatal(&self) -> bool {
        matches!(
            self,
            WaspError::NotFound { .. } | WaspError::CorruptRecord { .. } | WaspError::Io(_)
        )
    }

    /// Create a corrupt record error
    pub fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        WaspError::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }

    /// Create an invalid HTTP error
    pub fn invalid_http(reason: impl Into<String>) -> Self {
        WaspError::InvalidHttp {
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: impl Into<String>) -> Self {
        WaspError::Serialization(reason.into())
    }
}

impl From<bincode::Error> for WaspError {
    fn from(err: bincode::Error) -> Self {
        WaspError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_local() {
        let err = WaspError::MissingCorrelation {
            concurrent_id: "<urn:uuid:1>".to_string(),
        };
        assert!(err.is_record_local());
        assert!(!err.is_file_fatal());

        let err = WaspError::ExtractionFailure {
            reason: "empty document".to_string(),
        };
        assert!(err.is_record_local());
    }

    #[test]
    fn test_file_fatal() {
        let err = WaspError::corrupt(42, "bad version line");
        assert!(err.is_file_fatal());
        assert!(!err.is_record_local());
        assert_eq!(err.to_string(), "corrupt record at byte 42: bad version line");

        let err = WaspError::NotFound {
            path: PathBuf::from("/archives/missing.warc"),
        };
        assert!(err.is_file_fatal());
    }

    #[test]
    fn test_watch_error_is_neither() {
        let err = WaspError::WatchError {
            reason: "directory removed".to_string(),
        };
        assert!(!err.is_record_local());
        assert!(!err.is_file_fatal());
    }
}
