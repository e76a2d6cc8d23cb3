use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, warn};

use crate::{
    config::SegmentConfig,
    error::{LogError, LogResult},
    record::Record,
};

use super::{
    index::{ENTRY_WIDTH, Index},
    store::Store,
};

pub const STORE_FILE_EXT: &str = "store";
pub const INDEX_FILE_EXT: &str = "index";

pub fn store_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{}.{}", base_offset, STORE_FILE_EXT))
}

pub fn index_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{}.{}", base_offset, INDEX_FILE_EXT))
}

/// Snapshot of a segment's offset range and store size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub base_offset: u64,
    pub next_offset: u64,
    pub store_size: u64,
}

/// A store/index pair covering the offsets `[base_offset, next_offset)`.
pub struct Segment {
    store: Arc<Store>,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: SegmentConfig,
}

impl Segment {
    /// Opens (or creates) the segment files for `base_offset` in `dir` and
    /// recovers the next offset from the last index entry.
    pub fn open(dir: &Path, base_offset: u64, config: &SegmentConfig) -> LogResult<Self> {
        let store = Store::open(store_path(dir, base_offset))?;
        let index = Index::open(index_path(dir, base_offset), config.max_index_bytes)?;

        let next_offset = match index.last_entry() {
            Some((off, _)) => base_offset + off as u64 + 1,
            None => base_offset,
        };

        debug!(
            "Opened segment: base={}, next={}, store_size={}",
            base_offset,
            next_offset,
            store.size()
        );

        Ok(Self {
            store: Arc::new(store),
            index,
            base_offset,
            next_offset,
            config: config.clone(),
        })
    }

    /// Stamps the record with the next offset, writes it and returns that offset.
    pub fn append(&mut self, mut record: Record) -> LogResult<u64> {
        self.index.check_capacity()?;

        let cur = self.next_offset;
        record.offset = cur;

        let rel = u32::try_from(cur - self.base_offset).map_err(|_| LogError::CapacityExceeded {
            capacity: self.config.max_index_bytes,
        })?;

        let data = record.serialize()?;
        let (_, pos) = self.store.append(&data)?;
        self.index.write(rel, pos).map_err(|e| {
            warn!("Failed to index offset {} at position {}: {}", cur, pos, e);
            e
        })?;

        self.next_offset += 1;
        Ok(cur)
    }

    pub fn read(&self, offset: u64) -> LogResult<Record> {
        if !self.contains(offset) {
            return Err(LogError::OffsetOutOfRange { offset });
        }

        let (_, pos) = match self.index.read((offset - self.base_offset) as i64) {
            Ok(entry) => entry,
            Err(LogError::IndexOutOfRange(_)) => {
                return Err(LogError::OffsetOutOfRange { offset });
            }
            Err(e) => return Err(e),
        };

        let data = self.store.read(pos)?;
        Record::deserialize(&data)
    }

    pub fn is_closed(&self) -> bool {
        self.index.is_closed()
    }

    pub fn is_empty(&self) -> bool {
        self.next_offset == self.base_offset
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.base_offset <= offset && offset < self.next_offset
    }

    /// The store bound is soft (checked after the write that crossed it);
    /// the index bound is checked before the next entry would overflow.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() + ENTRY_WIDTH > self.config.max_index_bytes
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn info(&self) -> SegmentInfo {
        SegmentInfo {
            base_offset: self.base_offset,
            next_offset: self.next_offset,
            store_size: self.store.size(),
        }
    }

    /// Bytes on disk once closed: store plus the logical index size.
    pub fn disk_usage(&self) -> u64 {
        self.store.size() + self.index.size()
    }

    pub fn close(&mut self) -> LogResult<()> {
        self.index.close()?;
        self.store.close()
    }

    /// Closes the segment and deletes both of its files.
    pub fn remove(mut self) -> LogResult<()> {
        self.close()?;
        fs::remove_file(self.index.path()).map_err(|e| {
            warn!("Failed to delete index {:?}: {}", self.index.path(), e);
            e
        })?;
        fs::remove_file(self.store.path()).map_err(|e| {
            warn!("Failed to delete store {:?}: {}", self.store.path(), e);
            e
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::LEN_WIDTH;
    use tempfile::TempDir;

    fn test_config(max_store_bytes: u64, max_index_bytes: u64) -> SegmentConfig {
        SegmentConfig {
            max_store_bytes,
            max_index_bytes,
            initial_offset: 0,
        }
    }

    #[test]
    fn test_append_read_until_index_maxed() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(1024, ENTRY_WIDTH * 3);

        let mut segment = Segment::open(temp_dir.path(), 16, &config).unwrap();
        assert_eq!(segment.next_offset(), 16);
        assert!(!segment.is_maxed());

        for i in 0..3u64 {
            let off = segment.append(Record::new("hello world")).unwrap();
            assert_eq!(off, 16 + i);

            let got = segment.read(off).unwrap();
            assert_eq!(got.value, b"hello world");
            assert_eq!(got.offset, off);
        }

        assert!(segment.is_maxed());
        let store_size = segment.store().size();
        let err = segment.append(Record::new("hello world")).unwrap_err();
        assert!(matches!(err, LogError::CapacityExceeded { .. }));
        assert_eq!(segment.store().size(), store_size);
        assert_eq!(segment.next_offset(), 19);
    }

    #[test]
    fn test_append_after_close_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut segment = Segment::open(temp_dir.path(), 0, &test_config(1024, 1024)).unwrap();
        segment.append(Record::new("a")).unwrap();
        segment.close().unwrap();

        assert!(segment.is_closed());
        let store_size = segment.store().size();
        assert!(matches!(segment.append(Record::new("b")), Err(LogError::Closed)));
        assert_eq!(segment.store().size(), store_size);
    }

    #[test]
    fn test_store_maxed_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let record = Record::new("hello world");
        let width = LEN_WIDTH + record.serialize().unwrap().len() as u64;
        let config = test_config(width * 3, 1024);

        let mut segment = Segment::open(temp_dir.path(), 16, &config).unwrap();
        for _ in 0..3 {
            segment.append(record.clone()).unwrap();
        }
        assert!(segment.is_maxed());
        segment.close().unwrap();
        drop(segment);

        let segment = Segment::open(temp_dir.path(), 16, &config).unwrap();
        assert_eq!(segment.next_offset(), 19);
        assert!(segment.is_maxed());
        assert_eq!(segment.read(18).unwrap().offset, 18);
    }

    #[test]
    fn test_read_outside_range() {
        let temp_dir = TempDir::new().unwrap();
        let mut segment = Segment::open(temp_dir.path(), 5, &test_config(1024, 1024)).unwrap();
        segment.append(Record::new("a")).unwrap();

        assert!(matches!(
            segment.read(4),
            Err(LogError::OffsetOutOfRange { offset: 4 })
        ));
        assert!(matches!(
            segment.read(6),
            Err(LogError::OffsetOutOfRange { offset: 6 })
        ));
    }

    #[test]
    fn test_remove_deletes_files() {
        let temp_dir = TempDir::new().unwrap();
        let segment = Segment::open(temp_dir.path(), 0, &test_config(1024, 1024)).unwrap();

        assert!(store_path(temp_dir.path(), 0).exists());
        assert!(index_path(temp_dir.path(), 0).exists());

        segment.remove().unwrap();
        assert!(!store_path(temp_dir.path(), 0).exists());
        assert!(!index_path(temp_dir.path(), 0).exists());
    }
}
