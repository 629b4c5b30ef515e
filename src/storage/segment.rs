use std::fmt;
use std::io::Read;
use crate::core::config::CHUNK_SIZE;
use crate::core::error::Result;

/// Byte offset of a segment inside its index file; `0` means "none"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub u64);

impl Address {
    pub const NONE: Address = Address(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn is_some(&self) -> bool {
        self.0 != 0
    }

    pub fn offset(&self, bytes: u64) -> Address {
        Address(self.0 + bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Every shape of data that lives in an index file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Header,
    Statistic,
    AllocatorState,
    FreeNode,
    BucketArray,
    BucketHead,
    DocumentItem,
    DocumentChunk,
    TermNode,
    TermPosting,
    Position,
    NumericRoot,
    NumericNode,
    NumericPosting,
}

impl SegmentKind {
    /// Encoded size for fixed-shape kinds; `None` for length-prefixed ones
    pub fn fixed_size(&self) -> Option<u64> {
        let size = match self {
            SegmentKind::Header => 4,
            SegmentKind::Statistic => 8,
            SegmentKind::AllocatorState | SegmentKind::BucketArray => return None,
            SegmentKind::FreeNode | SegmentKind::BucketHead | SegmentKind::NumericRoot => 8,
            SegmentKind::DocumentItem => 16 + 8 + 4 + 8 + CHUNK_SIZE as u64,
            SegmentKind::DocumentChunk => 8 + CHUNK_SIZE as u64,
            SegmentKind::TermNode => 4 + 8 + 8 + 4 + 8,
            SegmentKind::TermPosting => 16 + 8 + 8,
            SegmentKind::Position => 4 + 8,
            SegmentKind::NumericNode => 8 + 8 + 8 + 4 + 8,
            SegmentKind::NumericPosting => 16 + 8 + 8,
        };
        Some(size)
    }

    /// Pinned kinds are never evicted by the cache decay pass
    pub fn is_pinned(&self) -> bool {
        matches!(
            self,
            SegmentKind::Header
                | SegmentKind::Statistic
                | SegmentKind::AllocatorState
                | SegmentKind::BucketArray
                | SegmentKind::BucketHead
                | SegmentKind::NumericRoot
                | SegmentKind::TermNode
                | SegmentKind::TermPosting
                | SegmentKind::Position
        )
    }
}

/// A typed unit of data stored at a file address
pub trait Segment: Clone + Send + Sync + 'static {
    const KIND: SegmentKind;

    fn address(&self) -> Address;

    fn encode(&self, buf: &mut Vec<u8>);

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self>;

    fn encoded_len(&self) -> u64 {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len() as u64
    }
}
