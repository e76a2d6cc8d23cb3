use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use memmap2::MmapMut;
use tracing::warn;

use crate::error::{LogError, LogResult};

const OFFSET_WIDTH: u64 = 4;
const POSITION_WIDTH: u64 = 8;

/// Width of one index entry: relative offset (u32 BE) + store position (u64 BE).
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Fixed-width index mapping relative offsets to store positions.
///
/// The backing file is grown to its full capacity while open so it can be
/// memory-mapped, and trimmed back to the written entries on close.
pub struct Index {
    path: PathBuf,
    file: File,
    mmap: Option<MmapMut>,
    size: u64,
}

impl Index {
    pub fn open(path: impl AsRef<Path>, max_index_bytes: u64) -> LogResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let size = file.metadata()?.len();
        file.set_len(size.max(max_index_bytes))?;

        let mmap = unsafe {
            MmapMut::map_mut(&file).map_err(|e| {
                warn!("Failed to map index {:?}: {}", path, e);
                e
            })?
        };

        Ok(Self {
            path,
            file,
            mmap: Some(mmap),
            size,
        })
    }

    /// Reads the entry for relative offset `rel`; `-1` reads the last entry.
    pub fn read(&self, rel: i64) -> LogResult<(u32, u64)> {
        let mmap = self.mmap.as_ref().ok_or(LogError::Closed)?;

        let entries = (self.size / ENTRY_WIDTH) as i64;
        let slot = if rel == -1 { entries - 1 } else { rel };
        if entries == 0 || slot < 0 || slot >= entries {
            return Err(LogError::IndexOutOfRange(rel));
        }

        let start = slot as usize * ENTRY_WIDTH as usize;
        let mut off = [0u8; OFFSET_WIDTH as usize];
        off.copy_from_slice(&mmap[start..start + OFFSET_WIDTH as usize]);
        let mut pos = [0u8; POSITION_WIDTH as usize];
        pos.copy_from_slice(&mmap[start + OFFSET_WIDTH as usize..start + ENTRY_WIDTH as usize]);

        Ok((u32::from_be_bytes(off), u64::from_be_bytes(pos)))
    }

    pub fn last_entry(&self) -> Option<(u32, u64)> {
        self.read(-1).ok()
    }

    /// Fails with `CapacityExceeded` when no further entry fits.
    pub fn check_capacity(&self) -> LogResult<()> {
        let mmap = self.mmap.as_ref().ok_or(LogError::Closed)?;
        let capacity = mmap.len() as u64;
        if self.size + ENTRY_WIDTH > capacity {
            return Err(LogError::CapacityExceeded { capacity });
        }
        Ok(())
    }

    pub fn write(&mut self, off: u32, pos: u64) -> LogResult<()> {
        self.check_capacity()?;
        let mmap = self.mmap.as_mut().ok_or(LogError::Closed)?;

        let start = self.size as usize;
        mmap[start..start + OFFSET_WIDTH as usize].copy_from_slice(&off.to_be_bytes());
        mmap[start + OFFSET_WIDTH as usize..start + ENTRY_WIDTH as usize]
            .copy_from_slice(&pos.to_be_bytes());
        self.size += ENTRY_WIDTH;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.mmap.is_none()
    }

    /// Logical size in bytes (written entries only).
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the mapping, syncs the file and trims it to its logical size.
    /// Calling it again is a no-op.
    pub fn close(&mut self) -> LogResult<()> {
        let Some(mmap) = self.mmap.take() else {
            return Ok(());
        };

        mmap.flush().map_err(|e| {
            warn!("Failed to flush index {:?}: {}", self.path, e);
            e
        })?;
        drop(mmap);

        self.file.sync_all()?;
        self.file.set_len(self.size)?;
        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close index {:?}: {}", self.path, e);
        }
    }
}
