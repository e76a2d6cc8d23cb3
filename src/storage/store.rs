use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, ErrorKind, Write},
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::LogResult;

/// Width of the big-endian length prefix in front of every record.
pub const LEN_WIDTH: u64 = 8;

// Store file format:
// | len (u64 BE) | record bytes | len (u64 BE) | record bytes | ...

struct StoreWriter {
    buf: BufWriter<File>,
    size: u64,
}

/// Append-only file of length-prefixed records.
///
/// Writes go through a buffer; every read flushes it first so a position
/// returned by [`Store::append`] is always readable.
pub struct Store {
    path: PathBuf,
    file: File,
    writer: Mutex<StoreWriter>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> LogResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let size = file.metadata()?.len();
        let writer = StoreWriter {
            buf: BufWriter::new(file.try_clone()?),
            size,
        };

        Ok(Self {
            path,
            file,
            writer: Mutex::new(writer),
        })
    }

    /// Appends `data` behind its length prefix. Returns the bytes written
    /// and the position the entry starts at.
    pub fn append(&self, data: &[u8]) -> LogResult<(u64, u64)> {
        let mut writer = self.writer.lock();
        let pos = writer.size;

        writer
            .buf
            .write_all(&(data.len() as u64).to_be_bytes())
            .map_err(|e| {
                warn!("Failed to write record length to {:?}: {}", self.path, e);
                e
            })?;
        writer.buf.write_all(data).map_err(|e| {
            warn!("Failed to write record to {:?}: {}", self.path, e);
            e
        })?;

        let written = LEN_WIDTH + data.len() as u64;
        writer.size += written;
        Ok((written, pos))
    }

    /// Reads the record that starts at `pos`. A length prefix that runs past
    /// the end of the store fails with `UnexpectedEof`.
    pub fn read(&self, pos: u64) -> LogResult<Vec<u8>> {
        self.flush()?;

        let mut len = [0u8; LEN_WIDTH as usize];
        self.file.read_exact_at(&mut len, pos)?;
        let len = u64::from_be_bytes(len);

        let end = pos
            .checked_add(LEN_WIDTH)
            .and_then(|start| start.checked_add(len));
        if end.is_none_or(|end| end > self.size()) {
            warn!(
                "Record at {} in {:?} claims {} bytes past the end of the store",
                pos, self.path, len
            );
            return Err(io::Error::from(ErrorKind::UnexpectedEof).into());
        }

        let mut data = vec![0u8; len as usize];
        self.file.read_exact_at(&mut data, pos + LEN_WIDTH)?;
        Ok(data)
    }

    /// Raw positional read; does not interpret length prefixes. Returns
    /// `Ok(0)` at end of file.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> LogResult<usize> {
        self.flush()?;
        Ok(self.file.read_at(buf, offset)?)
    }

    pub fn size(&self) -> u64 {
        self.writer.lock().size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered writes and syncs them to disk. The file handles are
    /// released when the store is dropped.
    pub fn close(&self) -> LogResult<()> {
        let mut writer = self.writer.lock();
        writer.buf.flush()?;
        writer.buf.get_ref().sync_all().map_err(|e| {
            warn!("Failed to sync store {:?}: {}", self.path, e);
            e
        })?;
        Ok(())
    }

    fn flush(&self) -> LogResult<()> {
        let mut writer = self.writer.lock();
        if !writer.buf.buffer().is_empty() {
            writer.buf.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogError;
    use tempfile::TempDir;

    const DATA: &[u8] = b"hello world";

    fn append_some(store: &Store, count: u64) {
        for i in 1..=count {
            let (n, pos) = store.append(DATA).unwrap();
            assert_eq!(n, LEN_WIDTH + DATA.len() as u64);
            assert_eq!(pos + n, n * i);
        }
    }

    #[test]
    fn test_append_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path().join("0.store")).unwrap();

        append_some(&store, 3);

        let width = LEN_WIDTH + DATA.len() as u64;
        for i in 0..3 {
            assert_eq!(store.read(i * width).unwrap(), DATA);
        }
        assert_eq!(store.size(), 3 * width);
    }

    #[test]
    fn test_read_at_returns_raw_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path().join("0.store")).unwrap();
        append_some(&store, 1);

        let mut len = [0u8; LEN_WIDTH as usize];
        assert_eq!(store.read_at(&mut len, 0).unwrap(), LEN_WIDTH as usize);
        assert_eq!(u64::from_be_bytes(len), DATA.len() as u64);

        let mut data = vec![0u8; DATA.len()];
        store.read_at(&mut data, LEN_WIDTH).unwrap();
        assert_eq!(data, DATA);

        let mut tail = [0u8; 4];
        assert_eq!(store.read_at(&mut tail, store.size()).unwrap(), 0);
    }

    #[test]
    fn test_read_past_end_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path().join("0.store")).unwrap();
        append_some(&store, 1);

        let err = store.read(store.size()).unwrap_err();
        assert!(matches!(err, LogError::Io(_)));
    }

    #[test]
    fn test_read_with_oversized_length_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path().join("0.store")).unwrap();
        store.append(&u64::MAX.to_be_bytes()).unwrap();
        store.append(DATA).unwrap();

        // Position 8 lands on the payload of the first entry.
        let err = store.read(LEN_WIDTH).unwrap_err();
        assert!(matches!(err, LogError::Io(ref e) if e.kind() == ErrorKind::UnexpectedEof));
        assert_eq!(store.read(0).unwrap(), u64::MAX.to_be_bytes());
    }

    #[test]
    fn test_reopen_keeps_size_and_data() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("0.store");

        {
            let store = Store::open(&path).unwrap();
            append_some(&store, 2);
            store.close().unwrap();
        }

        let store = Store::open(&path).unwrap();
        let width = LEN_WIDTH + DATA.len() as u64;
        assert_eq!(store.size(), 2 * width);
        assert_eq!(store.read(width).unwrap(), DATA);

        let (_, pos) = store.append(DATA).unwrap();
        assert_eq!(pos, 2 * width);
        assert_eq!(store.read(pos).unwrap(), DATA);
    }
}
