use std::path::PathBuf;

use blobpack_types::BlobId;

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested blob was never stored.
    #[error("blob not found: {0}")]
    NotFound(BlobId),

    /// The index file does not start with the expected sentinel line.
    #[error("invalid index file header: found {found:?}")]
    InvalidIndexHeader { found: String },

    /// A complete index line could not be decoded.
    #[error("invalid index line {line}: {reason}")]
    InvalidIndexLine { line: u64, reason: String },

    /// An index line carries a digest of the wrong length.
    #[error("invalid digest length on index line {line}: expected {expected} bytes, got {actual}")]
    InvalidDigestLength {
        line: u64,
        expected: usize,
        actual: usize,
    },

    /// The index references a segment file that is not on disk.
    #[error("segment file {segment} missing at {}", .path.display())]
    SegmentFileMissing { segment: u32, path: PathBuf },

    /// The index references bytes past the end of a segment file.
    #[error("segment {segment} is {actual} bytes but the index needs {needed}")]
    SegmentTruncated {
        segment: u32,
        needed: u64,
        actual: u64,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// The store configuration is unusable.
    #[error("invalid store config: {0}")]
    InvalidConfig(String),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` for a routine lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
