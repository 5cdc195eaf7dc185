//! Error types for restore operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a bucket directory or object key name fails to decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BucketNameError {
    /// Fewer than four `_`-separated fields.
    #[error("unexpected bucket name format '{0}' (expected: index_newest_oldest_id)")]
    MalformedName(String),

    /// Field 2 or 3 is not a base-10 integer.
    #[error("invalid epoch '{field}' in bucket name '{name}'")]
    InvalidEpoch { name: String, field: String },
}

/// Errors that can occur during restore operations.
#[derive(Error, Debug)]
pub enum RestoreError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// Invalid or incomplete configuration. Always fatal, raised before any stage runs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A source or staging directory could not be read.
    #[error("Source unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A bucket name could not be decoded.
    #[error(transparent)]
    BucketName(#[from] BucketNameError),

    /// Copying a bucket into the staging area failed.
    #[error("Failed to copy bucket {bucket}: {reason}")]
    Copy { bucket: String, reason: String },

    /// The integrity check reported a failure or produced unparsable output.
    #[error("Integrity check failed for bucket {bucket}: {reason}")]
    IntegrityCheck { bucket: String, reason: String },

    /// The external rebuild exited non-zero.
    #[error("Rebuild failed for bucket {bucket}: {reason}")]
    Rebuild { bucket: String, reason: String },

    /// The external service restart failed.
    #[error("Splunk restart failed: {0}")]
    RestartFailed(String),

    /// Listing the remote store failed.
    #[error("Failed to list remote objects: {0}")]
    RemoteListing(String),

    /// A single object download failed.
    #[error("Download failed for {key}: {reason}")]
    Download { key: String, reason: String },

    /// An external process could not be spawned.
    #[error("Failed to run {program}: {source}")]
    Process {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl RestoreError {
    /// Returns true for errors that end the job instead of excluding one bucket.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RestoreError::Config(_) | RestoreError::RestartFailed(_) | RestoreError::RemoteListing(_)
        )
    }
}
