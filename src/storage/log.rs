//! Multi-segment commit log.
//!
//! The log keeps its segments ordered by base offset behind a single
//! readers/writer lock. The last segment is the active one; every other
//! segment is sealed and only serves reads.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{LogError, LogResult},
    record::Record,
};

use super::{
    reader::LogReader,
    segment::{INDEX_FILE_EXT, STORE_FILE_EXT, Segment, SegmentInfo},
};

pub struct Log {
    dir: PathBuf,
    config: Config,
    /// Ordered by ascending base offset, never empty while open. The last
    /// element is the active segment.
    segments: RwLock<Vec<Segment>>,
}

impl Log {
    /// Opens the log stored in `dir`, rebuilding one segment per
    /// `<base>.store`/`<base>.index` pair. An empty directory gets a single
    /// segment at the configured initial offset.
    pub fn open(dir: impl Into<PathBuf>, config: Config) -> LogResult<Self> {
        let dir = dir.into();
        let config = config.normalized();
        let segments = Self::load_segments(&dir, &config)?;

        Ok(Self {
            dir,
            config,
            segments: RwLock::new(segments),
        })
    }

    fn load_segments(dir: &Path, config: &Config) -> LogResult<Vec<Segment>> {
        fs::create_dir_all(dir)?;

        let entries = fs::read_dir(dir).map_err(|source| LogError::Recovery {
            dir: dir.to_path_buf(),
            source,
        })?;

        // base offset -> (has store, has index)
        let mut groups: BTreeMap<u64, (bool, bool)> = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| LogError::Recovery {
                dir: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();

            let Some((base_offset, ext)) = parse_segment_file(&path) else {
                warn!("Skipping unrecognized file in log directory: {:?}", path);
                continue;
            };

            let group = groups.entry(base_offset).or_default();
            match ext {
                STORE_FILE_EXT => group.0 = true,
                _ => group.1 = true,
            }
        }

        let mut segments = Vec::with_capacity(groups.len().max(1));
        for (base_offset, group) in groups {
            match group {
                (true, true) => {}
                (false, _) => {
                    return Err(LogError::MissingSegmentFile {
                        base_offset,
                        missing: STORE_FILE_EXT,
                    });
                }
                (_, false) => {
                    return Err(LogError::MissingSegmentFile {
                        base_offset,
                        missing: INDEX_FILE_EXT,
                    });
                }
            }

            let segment = Segment::open(dir, base_offset, &config.segment).map_err(|e| {
                warn!("Failed to load segment {} in {:?}: {}", base_offset, dir, e);
                e
            })?;
            info!(
                "Loaded segment: base={}, next={}",
                segment.base_offset(),
                segment.next_offset()
            );
            segments.push(segment);
        }

        if segments.is_empty() {
            let initial_offset = config.segment.initial_offset;
            segments.push(Segment::open(dir, initial_offset, &config.segment)?);
            info!("Created new segment: base={}, dir={:?}", initial_offset, dir);
        }

        Ok(segments)
    }

    /// Appends a record to the active segment, rolling over to a new segment
    /// first if the active one is full. Returns the assigned offset.
    ///
    /// An empty segment never rolls over, so base offsets stay strictly
    /// increasing.
    pub fn append(&self, record: Record) -> LogResult<u64> {
        let mut segments = self.segments.write();

        let active = Self::active(&segments)?;
        if active.is_closed() {
            return Err(LogError::Closed);
        }
        if active.is_maxed() && !active.is_empty() {
            let old_base = active.base_offset();
            let base_offset = active.next_offset();
            let segment = Segment::open(&self.dir, base_offset, &self.config.segment)?;
            segments.push(segment);
            info!(
                "Rolled over to new segment: base={}, sealed={}",
                base_offset, old_base
            );
        }

        match segments.last_mut() {
            Some(active) => active.append(record),
            None => Err(LogError::Closed),
        }
    }

    pub fn read(&self, offset: u64) -> LogResult<Record> {
        let segments = self.segments.read();

        segments
            .iter()
            .take_while(|s| s.base_offset() <= offset)
            .find(|s| s.contains(offset))
            .ok_or(LogError::OffsetOutOfRange { offset })?
            .read(offset)
    }

    pub fn lowest_offset(&self) -> LogResult<u64> {
        let segments = self.segments.read();
        segments
            .first()
            .map(Segment::base_offset)
            .ok_or(LogError::Closed)
    }

    /// Offset of the last record, or 0 when nothing was ever appended.
    pub fn highest_offset(&self) -> LogResult<u64> {
        let segments = self.segments.read();
        let next_offset = Self::active(&segments)?.next_offset();
        Ok(next_offset.saturating_sub(1))
    }

    /// Deletes every segment whose records are all at or below `lowest`.
    ///
    /// When that covers the active segment as well, a fresh empty segment
    /// takes its place so offsets keep counting from where they stopped.
    pub fn truncate(&self, lowest: u64) -> LogResult<()> {
        let mut segments = self.segments.write();
        let next_offset = Self::active(&segments)?.next_offset();

        let mut removed = Vec::new();
        while segments
            .first()
            .is_some_and(|s| s.next_offset() <= lowest.saturating_add(1))
        {
            let segment = segments.remove(0);
            let base_offset = segment.base_offset();
            segment.remove()?;
            removed.push(base_offset);
        }

        if segments.is_empty() {
            segments.push(Segment::open(&self.dir, next_offset, &self.config.segment)?);
        }

        if !removed.is_empty() {
            info!("Truncated log below {}: removed segments {:?}", lowest, removed);
        }
        Ok(())
    }

    /// Returns a reader over the raw store bytes of every segment.
    pub fn reader(&self) -> LogReader {
        let segments = self.segments.read();
        LogReader::new(segments.iter().map(|s| s.store().clone()))
    }

    /// Closes every segment. Offset queries keep answering afterwards;
    /// reads and appends fail.
    pub fn close(&self) -> LogResult<()> {
        let mut segments = self.segments.write();
        Self::close_segments(&mut segments)
    }

    /// Closes the log and deletes its directory.
    pub fn remove(&self) -> LogResult<()> {
        let mut segments = self.segments.write();
        self.remove_locked(&mut segments)
    }

    /// Removes the log and starts over with a single empty segment.
    pub fn reset(&self) -> LogResult<()> {
        let mut segments = self.segments.write();
        self.remove_locked(&mut segments)?;
        *segments = Self::load_segments(&self.dir, &self.config)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.segments.read().iter().map(Segment::info).collect()
    }

    pub fn disk_usage(&self) -> u64 {
        self.segments.read().iter().map(Segment::disk_usage).sum()
    }

    fn active(segments: &[Segment]) -> LogResult<&Segment> {
        segments.last().ok_or(LogError::Closed)
    }

    fn close_segments(segments: &mut [Segment]) -> LogResult<()> {
        for segment in segments.iter_mut() {
            segment.close()?;
        }
        Ok(())
    }

    fn remove_locked(&self, segments: &mut Vec<Segment>) -> LogResult<()> {
        Self::close_segments(segments)?;
        segments.clear();
        fs::remove_dir_all(&self.dir).map_err(|e| {
            warn!("Failed to remove log directory {:?}: {}", self.dir, e);
            e
        })?;
        info!("Removed log directory {:?}", self.dir);
        Ok(())
    }
}

/// Splits `<base>.store` / `<base>.index` into its base offset and extension.
fn parse_segment_file(path: &Path) -> Option<(u64, &'static str)> {
    let ext = match path.extension()?.to_str()? {
        STORE_FILE_EXT => STORE_FILE_EXT,
        INDEX_FILE_EXT => INDEX_FILE_EXT,
        _ => return None,
    };
    let base_offset = path.file_stem()?.to_str()?.parse::<u64>().ok()?;
    Some((base_offset, ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segment_file() {
        assert_eq!(
            parse_segment_file(Path::new("/tmp/log/16.store")),
            Some((16, STORE_FILE_EXT))
        );
        assert_eq!(
            parse_segment_file(Path::new("0.index")),
            Some((0, INDEX_FILE_EXT))
        );
        assert_eq!(parse_segment_file(Path::new("abc.index")), None);
        assert_eq!(parse_segment_file(Path::new("16.log")), None);
        assert_eq!(parse_segment_file(Path::new("16")), None);
    }
}
