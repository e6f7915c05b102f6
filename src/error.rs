//! Error types for media-dl
//!
//! This module provides the error handling for the library, including:
//! - Domain-specific error types (Download, Database)
//! - Context information (unit index, transcoder action, archive path, etc.)
//! - Classification helpers used by the orchestrator to decide how a failure is reported

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "temp_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Download pipeline error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error (malformed job payload, etc.)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stream decryption failed (bad key, bad padding, etc.)
    #[error("decryption error: {0}")]
    Decryption(String),

    /// External tool execution failed (ffmpeg, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, missing collaborator, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Task not found
    #[error("task not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error only informs the caller that the content is already known
    /// (queued or downloaded) and no state was changed.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            Error::Download(DownloadError::AlreadyQueued { .. })
                | Error::Download(DownloadError::AlreadyDownloaded { .. })
        )
    }

    /// Whether this error represents a cooperative cancellation rather than a failure
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Download(DownloadError::Canceled))
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// A task with the same dedup hash already exists
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The registry writer task is gone (registry dropped or panicked)
    #[error("registry writer closed")]
    WriterClosed,
}

/// Errors raised by the download/assembly pipeline
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A task with the same content is still pending or running
    #[error("already queued: {hash}")]
    AlreadyQueued {
        /// Dedup hash of the content
        hash: String,
    },

    /// The same content was already downloaded successfully
    #[error("already downloaded: {hash}")]
    AlreadyDownloaded {
        /// Dedup hash of the content
        hash: String,
    },

    /// Fetching one of the input units failed
    #[error("failed to fetch unit {unit}: {reason}")]
    FetchFailed {
        /// Index of the unit in the request
        unit: usize,
        /// The reason the fetch failed
        reason: String,
    },

    /// Overlay merge requires exactly one primary and one overlay asset
    #[error("overlay merge needs exactly 2 assets (one overlay), got {count}")]
    MalformedMergeInput {
        /// Number of assets that were present
        count: usize,
    },

    /// Streamed playlist job did not yield a usable manifest
    #[error("malformed playlist: {0}")]
    MalformedPlaylist(String),

    /// External transcoder failed
    #[error("{action} failed: {reason}")]
    TranscodeFailed {
        /// Transcoder action that was running
        action: String,
        /// The reason the transcoder failed
        reason: String,
    },

    /// Output sink rejected the final artifact
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// Final artifact has no recognizable media type
    #[error("unknown media type for {path}")]
    UnknownMediaType {
        /// The file that could not be classified
        path: PathBuf,
    },

    /// Archive container could not be unpacked
    #[error("failed to unpack {archive}: {reason}")]
    ArchiveFailed {
        /// The archive file that failed to unpack
        archive: PathBuf,
        /// The reason unpacking failed
        reason: String,
    },

    /// Job was canceled
    #[error("canceled")]
    Canceled,

    /// The request itself is invalid
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
