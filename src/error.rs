use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the commit log and its segments.
#[derive(Debug, Error)]
pub enum LogError {
    /// The requested offset is below the lowest retained offset or at/after
    /// the next offset to be assigned.
    #[error("offset out of range: {offset}")]
    OffsetOutOfRange { offset: u64 },

    /// Index lookup for a relative offset the index does not hold.
    #[error("index entry {0} out of range")]
    IndexOutOfRange(i64),

    /// Writing one more index entry would overflow the mapped region.
    #[error("index capacity of {capacity} bytes exceeded")]
    CapacityExceeded { capacity: u64 },

    #[error("index is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to recover log from {dir:?}: {source}")]
    Recovery {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("segment {base_offset} is missing its {missing} file")]
    MissingSegmentFile {
        base_offset: u64,
        missing: &'static str,
    },

    #[error("record encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("record decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

pub type LogResult<T> = Result<T, LogError>;
