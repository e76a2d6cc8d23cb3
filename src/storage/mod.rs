//! On-disk storage for the commit log.
//!
//! # Module Structure
//!
//! - `store`: append-only file of length-prefixed records
//! - `index`: memory-mapped offset → store position index
//! - `segment`: a store/index pair covering a contiguous offset range
//! - `log`: ordered segments with rollover, retention and recovery
//! - `reader`: sequential export of the raw store bytes

mod index;
mod log;
mod reader;
mod segment;
mod store;


pub use index::{ENTRY_WIDTH, Index};
pub use log::Log;
pub use reader::{LogReader, RecordDecoder, read_frame};
pub use segment::{INDEX_FILE_EXT, STORE_FILE_EXT, Segment, SegmentInfo, index_path, store_path};
pub use store::{LEN_WIDTH, Store};
