use bincode::{Decode, Encode};
use tracing::warn;

use crate::error::LogResult;

/// A single entry of the commit log. The offset is assigned by the segment
/// on append; any value set by the caller is overwritten.
#[derive(Debug, Default, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Record {
    pub value: Vec<u8>,
    pub offset: u64,
}

impl Record {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            offset: 0,
        }
    }

    pub fn serialize(&self) -> LogResult<Vec<u8>> {
        let config = bincode::config::standard();
        Ok(bincode::encode_to_vec(self, config)?)
    }

    pub fn deserialize(data: &[u8]) -> LogResult<Self> {
        let config = bincode::config::standard();
        let (record, _) = bincode::decode_from_slice(data, config).map_err(|e| {
            warn!("Failed to deserialize record: {}", e);
            e
        })?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization_keeps_offset() {
        let mut record = Record::new("hello world");
        record.offset = 42;

        let bytes = record.serialize().unwrap();
        let decoded = Record::deserialize(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_deserialize_garbage_fails() {
        assert!(Record::deserialize(&[0xff]).is_err());
    }
}
