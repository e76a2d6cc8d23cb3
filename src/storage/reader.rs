use std::{
    collections::VecDeque,
    io::{self, ErrorKind, Read},
    sync::Arc,
};

use crate::{
    error::{LogError, LogResult},
    record::Record,
};

use super::store::{LEN_WIDTH, Store};

/// Reads one store file from the start, without interpreting it.
struct StoreReader {
    store: Arc<Store>,
    off: u64,
}

impl Read for StoreReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.store.read_at(buf, self.off).map_err(|e| match e {
            LogError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        })?;
        self.off += n as u64;
        Ok(n)
    }
}

/// Sequential reader over the raw store bytes of every segment, oldest
/// segment first.
///
/// The segments are captured when the reader is built; it does not hold the
/// log lock while being read.
pub struct LogReader {
    readers: VecDeque<StoreReader>,
}

impl LogReader {
    pub(crate) fn new(stores: impl IntoIterator<Item = Arc<Store>>) -> Self {
        Self {
            readers: stores
                .into_iter()
                .map(|store| StoreReader { store, off: 0 })
                .collect(),
        }
    }
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(reader) = self.readers.front_mut() {
            let n = reader.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.readers.pop_front();
        }
        Ok(0)
    }
}

/// Reads one length-prefixed frame. Returns `None` on a clean end of stream.
pub fn read_frame<R: Read>(reader: &mut R) -> LogResult<Option<Vec<u8>>> {
    let mut len = [0u8; LEN_WIDTH as usize];
    let mut filled = 0;
    while filled < len.len() {
        match reader.read(&mut len[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    // Buffer only what the stream holds; the prefix may be corrupt.
    let len = u64::from_be_bytes(len);
    let mut data = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut data)?;
    if data.len() as u64 != len {
        return Err(io::Error::from(ErrorKind::UnexpectedEof).into());
    }
    Ok(Some(data))
}

/// Decodes records from a stream produced by [`LogReader`].
pub struct RecordDecoder<R> {
    reader: R,
}

impl<R: Read> RecordDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> Iterator for RecordDecoder<R> {
    type Item = LogResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match read_frame(&mut self.reader) {
            Ok(Some(data)) => Some(Record::deserialize(&data)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reader_concatenates_stores_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let first = Arc::new(Store::open(temp_dir.path().join("0.store")).unwrap());
        let empty = Arc::new(Store::open(temp_dir.path().join("1.store")).unwrap());
        let second = Arc::new(Store::open(temp_dir.path().join("2.store")).unwrap());
        first.append(b"first").unwrap();
        second.append(b"second").unwrap();
        second.append(b"third").unwrap();

        let mut reader = LogReader::new([first, empty, second]);
        let mut frames = Vec::new();
        while let Some(frame) = read_frame(&mut reader).unwrap() {
            frames.push(frame);
        }
        assert_eq!(frames, vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]);
    }

    #[test]
    fn test_truncated_frame_fails() {
        let mut bytes = 10u64.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        assert!(read_frame(&mut bytes.as_slice()).is_err());

        let mut partial_len: &[u8] = &[0, 0, 0];
        assert!(read_frame(&mut partial_len).is_err());

        let mut huge = u64::MAX.to_be_bytes().to_vec();
        huge.extend_from_slice(b"abc");
        let err = read_frame(&mut huge.as_slice()).unwrap_err();
        assert!(matches!(err, LogError::Io(ref e) if e.kind() == ErrorKind::UnexpectedEof));

        let mut empty: &[u8] = &[];
        assert!(read_frame(&mut empty).unwrap().is_none());
    }
}
