//! Append-only, offset-addressed commit log.
//!
//! Records are appended to a directory of segments. Each segment pairs a
//! store file (length-prefixed records) with a memory-mapped index file
//! (relative offset → store position). The [`Log`] assigns offsets, rolls
//! over to a new segment when the active one fills up, answers reads by
//! offset and deletes whole segments on truncation.
//!
//! [`server::LogService`] adapts the log to async produce/consume calls for
//! a transport layer.

pub mod config;
pub mod error;
pub mod record;
pub mod server;
pub mod storage;

pub use config::{Config, SegmentConfig, ServiceConfig};
pub use error::{LogError, LogResult};
pub use record::Record;
pub use storage::{Log, LogReader, RecordDecoder, SegmentInfo, read_frame};
