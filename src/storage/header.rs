use std::io::Read;
use std::sync::Arc;
use parking_lot::Mutex;
use crate::core::config::FORMAT_VERSION;
use crate::core::error::{Error, Result};
use crate::storage::codec::Codec;
use crate::storage::file::StorageFile;
use crate::storage::segment::{Address, Segment, SegmentKind};

/// File type tag + format version, written once at offset 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSegment {
    pub address: Address,
    pub tag: [u8; 3],
    pub version: u8,
}

impl HeaderSegment {
    pub const SIZE: u64 = 4;

    pub fn new(address: Address, tag: [u8; 3]) -> Self {
        HeaderSegment {
            address,
            tag,
            version: FORMAT_VERSION,
        }
    }

    /// Rejects files of another type or format version
    pub fn validate(&self, expected: [u8; 3]) -> Result<()> {
        if self.tag != expected {
            return Err(Error::invalid_state(format!(
                "Unexpected file type {:?}, expected {:?}",
                String::from_utf8_lossy(&self.tag),
                String::from_utf8_lossy(&expected)
            )));
        }
        if self.version != FORMAT_VERSION {
            return Err(Error::invalid_state(format!(
                "Incompatible format version {} (supported: {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }
}

impl Segment for HeaderSegment {
    const KIND: SegmentKind = SegmentKind::Header;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.tag);
        Codec::put_u8(buf, self.version);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        let mut tag = [0u8; 3];
        reader.read_exact(&mut tag)?;
        let version = Codec::get_u8(reader)?;
        Ok(HeaderSegment { address, tag, version })
    }
}

/// Total item counter of one index file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticSegment {
    pub address: Address,
    pub count: u64,
}

impl StatisticSegment {
    pub const SIZE: u64 = 8;
}

impl Segment for StatisticSegment {
    const KIND: SegmentKind = SegmentKind::Statistic;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_u64(buf, self.count);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        Ok(StatisticSegment {
            address,
            count: Codec::get_u64(reader)?,
        })
    }
}

/// Serialized read-modify-write access to the statistic segment
pub struct Statistic {
    file: Arc<StorageFile>,
    address: Address,
    lock: Mutex<()>,
}

impl Statistic {
    pub fn new(file: Arc<StorageFile>, address: Address) -> Self {
        Statistic {
            file,
            address,
            lock: Mutex::new(()),
        }
    }

    pub fn get(&self) -> Result<u64> {
        Ok(self.file.read::<StatisticSegment>(self.address)?.count)
    }

    pub fn set(&self, count: u64) -> Result<()> {
        let _guard = self.lock.lock();
        self.file.write(&StatisticSegment { address: self.address, count })
    }

    /// Applies `delta`, saturating at zero
    pub fn add(&self, delta: i64) -> Result<u64> {
        let _guard = self.lock.lock();
        let mut statistic: StatisticSegment = self.file.read(self.address)?;
        statistic.count = if delta >= 0 {
            statistic.count.saturating_add(delta as u64)
        } else {
            statistic.count.saturating_sub(delta.unsigned_abs())
        };
        self.file.write(&statistic)?;
        Ok(statistic.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_validation() {
        let header = HeaderSegment::new(Address(0), *b"WDS");
        assert!(header.validate(*b"WDS").is_ok());
        assert!(header.validate(*b"WRT").is_err());

        let old = HeaderSegment { version: FORMAT_VERSION + 1, ..header };
        assert!(old.validate(*b"WDS").is_err());
    }

    #[test]
    fn test_header_encoding_is_four_bytes() {
        let header = HeaderSegment::new(Address(0), *b"WRN");
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len() as u64, HeaderSegment::SIZE);

        let decoded = HeaderSegment::decode(Address(0), &mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, header);
    }
}
