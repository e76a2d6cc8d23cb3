use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::ENTRY_WIDTH;

/// Default store size (bytes) before a segment rolls over.
pub const DEFAULT_MAX_STORE_BYTES: u64 = 1024;

/// Default index size (bytes) before a segment rolls over.
pub const DEFAULT_MAX_INDEX_BYTES: u64 = 1024;

/// Configuration for a [`Log`](crate::Log).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub segment: SegmentConfig,
}

/// Per-segment capacity limits and the offset an empty log starts at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Soft cap on the store file; checked after each append.
    pub max_store_bytes: u64,
    /// Hard cap on the index file; checked before each append. Never less
    /// than one index entry once normalized.
    pub max_index_bytes: u64,
    /// First offset assigned when the log is created empty.
    pub initial_offset: u64,
}

impl Config {
    /// Returns a copy with zero-valued limits replaced by their defaults.
    /// Each limit is defaulted on its own. An index limit too small for a
    /// single entry is raised to one entry.
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        if config.segment.max_store_bytes == 0 {
            config.segment.max_store_bytes = DEFAULT_MAX_STORE_BYTES;
        }
        if config.segment.max_index_bytes == 0 {
            config.segment.max_index_bytes = DEFAULT_MAX_INDEX_BYTES;
        }
        config.segment.max_index_bytes = config.segment.max_index_bytes.max(ENTRY_WIDTH);
        config
    }

    pub fn with_segment_limits(max_store_bytes: u64, max_index_bytes: u64) -> Self {
        Self {
            segment: SegmentConfig {
                max_store_bytes,
                max_index_bytes,
                initial_offset: 0,
            },
        }
    }
}

/// Options for the [`LogService`](crate::server::LogService) adapter.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// How long a consume stream waits before retrying an offset that has
    /// not been written yet.
    pub consume_poll_interval: Duration,
    /// Capacity of the response channels handed back by the stream calls.
    pub stream_buffer: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            consume_poll_interval: Duration::from_millis(50),
            stream_buffer: 64,
        }
    }
}
