use std::io::Read;
use std::sync::Arc;
use parking_lot::Mutex;
use crate::core::error::{Error, Result};
use crate::storage::codec::Codec;
use crate::storage::file::StorageFile;
use crate::storage::segment::{Address, Segment, SegmentKind};

/// A freed segment reinterpreted as `{successor}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeNode {
    pub address: Address,
    pub next: Address,
}

impl Segment for FreeNode {
    const KIND: SegmentKind = SegmentKind::FreeNode;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_address(buf, self.next);
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        Ok(FreeNode {
            address,
            next: Codec::get_address(reader)?,
        })
    }
}

/// Persisted bump pointer plus one free-list head per size class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorState {
    pub address: Address,
    pub next_free: u64,
    pub heads: Vec<Address>,
}

impl AllocatorState {
    pub fn encoded_size(classes: usize) -> u64 {
        1 + 8 + 8 * classes as u64
    }
}

impl Segment for AllocatorState {
    const KIND: SegmentKind = SegmentKind::AllocatorState;

    fn address(&self) -> Address {
        self.address
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        Codec::put_u8(buf, self.heads.len() as u8);
        Codec::put_u64(buf, self.next_free);
        for head in &self.heads {
            Codec::put_address(buf, *head);
        }
    }

    fn decode<R: Read>(address: Address, reader: &mut R) -> Result<Self> {
        let count = Codec::get_u8(reader)? as usize;
        let next_free = Codec::get_u64(reader)?;
        let mut heads = Vec::with_capacity(count);
        for _ in 0..count {
            heads.push(Codec::get_address(reader)?);
        }
        Ok(AllocatorState { address, next_free, heads })
    }
}

/// Size classes managed for a document store
pub const DOCUMENT_STORE_CLASSES: &[SegmentKind] = &[
    SegmentKind::DocumentItem,
    SegmentKind::DocumentChunk,
];

/// Size classes managed for a term reverse index
pub const TERM_INDEX_CLASSES: &[SegmentKind] = &[
    SegmentKind::TermNode,
    SegmentKind::TermPosting,
    SegmentKind::Position,
];

/// Size classes managed for a numeric reverse index
pub const NUMERIC_INDEX_CLASSES: &[SegmentKind] = &[
    SegmentKind::NumericNode,
    SegmentKind::NumericPosting,
];

/// Segregated free lists layered on the file's bump allocation
pub struct Allocator {
    file: Arc<StorageFile>,
    address: Address,
    classes: &'static [SegmentKind],
    heads: Mutex<Vec<Address>>,
}

impl Allocator {
    /// Fresh allocator; writes its initial state at `address`
    pub fn create(file: Arc<StorageFile>, address: Address, classes: &'static [SegmentKind]) -> Result<Self> {
        let allocator = Allocator {
            file,
            address,
            classes,
            heads: Mutex::new(vec![Address::NONE; classes.len()]),
        };
        allocator.reset()?;
        Ok(allocator)
    }

    /// Reads a persisted state back and restores the file's bump pointer
    pub fn load(file: Arc<StorageFile>, address: Address, classes: &'static [SegmentKind]) -> Result<Self> {
        let state: AllocatorState = file.read(address)?;
        if state.heads.len() != classes.len() {
            return Err(Error::invalid_state(format!(
                "Allocator state has {} size classes, expected {}",
                state.heads.len(),
                classes.len()
            )));
        }

        file.set_next_free(state.next_free);
        Ok(Allocator {
            file,
            address,
            classes,
            heads: Mutex::new(state.heads),
        })
    }

    /// Empties every free list and persists the current bump pointer
    pub fn reset(&self) -> Result<()> {
        let mut heads = self.heads.lock();
        heads.iter_mut().for_each(|head| *head = Address::NONE);
        self.persist(&heads)
    }

    fn class_index(&self, kind: SegmentKind) -> Result<usize> {
        self.classes.iter().position(|k| *k == kind).ok_or_else(|| {
            Error::invalid_argument(format!("{:?} is not a size class of this allocator", kind))
        })
    }

    fn persist(&self, heads: &[Address]) -> Result<()> {
        self.file.write(&AllocatorState {
            address: self.address,
            next_free: self.file.next_free(),
            heads: heads.to_vec(),
        })
    }

    /// Reuses the most recently freed segment of `kind`, else bumps the file
    pub fn alloc(&self, kind: SegmentKind) -> Result<Address> {
        let index = self.class_index(kind)?;
        let size = kind
            .fixed_size()
            .ok_or_else(|| Error::invalid_argument(format!("{:?} has no fixed size", kind)))?;

        let mut heads = self.heads.lock();
        let head = heads[index];
        let address = if head.is_some() {
            let node: FreeNode = self.file.read(head)?;
            heads[index] = node.next;
            self.file.invalidate(head);
            head
        } else {
            self.file.alloc(size)?
        };

        self.persist(&heads)?;
        Ok(address)
    }

    /// Pushes the segment's address onto the free list of its kind
    pub fn free<T: Segment>(&self, segment: &T) -> Result<()> {
        let index = self.class_index(T::KIND)?;
        let address = segment.address();
        if address.is_none() {
            return Err(Error::invalid_argument(format!("Free of {:?} at the null address", T::KIND)));
        }

        let mut heads = self.heads.lock();
        self.file.invalidate(address);
        self.file.write(&FreeNode { address, next: heads[index] })?;
        heads[index] = address;

        self.persist(&heads)
    }

    /// Addresses on the free list of `kind`, most recently freed first
    pub fn free_list(&self, kind: SegmentKind) -> Result<Vec<Address>> {
        let index = self.class_index(kind)?;
        let mut current = self.heads.lock()[index];
        let mut addresses = Vec::new();
        while current.is_some() {
            addresses.push(current);
            current = self.file.read::<FreeNode>(current)?.next;
        }
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::core::config::Config;
    use crate::core::error::ErrorKind;
    use crate::index::posting::Position;
    use crate::index::trie::TermNode;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> (Arc<StorageFile>, Allocator) {
        let config = Config {
            maintenance_interval: Duration::from_secs(3600),
            ..Config::default()
        };
        let file = Arc::new(StorageFile::open(dir.path().join("t.wrt"), &config).unwrap());
        file.alloc(16).unwrap();
        let address = file.alloc(AllocatorState::encoded_size(TERM_INDEX_CLASSES.len())).unwrap();
        let allocator = Allocator::create(file.clone(), address, TERM_INDEX_CLASSES).unwrap();
        (file, allocator)
    }

    #[test]
    fn test_freed_address_is_reused_first() {
        let dir = TempDir::new().unwrap();
        let (file, allocator) = open(&dir);

        let first = allocator.alloc(SegmentKind::Position).unwrap();
        let second = allocator.alloc(SegmentKind::Position).unwrap();
        assert_eq!(second.0 - first.0, SegmentKind::Position.fixed_size().unwrap());

        allocator.free(&Position::new(first, 3)).unwrap();
        let bump = file.next_free();

        assert_eq!(allocator.alloc(SegmentKind::Position).unwrap(), first);
        assert_eq!(file.next_free(), bump);
        assert_ne!(allocator.alloc(SegmentKind::Position).unwrap(), first);
    }

    #[test]
    fn test_free_lists_are_lifo_and_per_class() {
        let dir = TempDir::new().unwrap();
        let (_file, allocator) = open(&dir);

        let a = allocator.alloc(SegmentKind::Position).unwrap();
        let b = allocator.alloc(SegmentKind::Position).unwrap();
        let node = allocator.alloc(SegmentKind::TermNode).unwrap();

        allocator.free(&Position::new(a, 0)).unwrap();
        allocator.free(&Position::new(b, 0)).unwrap();
        allocator.free(&TermNode::new(node, 'x')).unwrap();

        assert_eq!(allocator.free_list(SegmentKind::Position).unwrap(), vec![b, a]);
        assert_eq!(allocator.free_list(SegmentKind::TermNode).unwrap(), vec![node]);
        assert_eq!(allocator.alloc(SegmentKind::TermNode).unwrap(), node);
        assert_eq!(allocator.alloc(SegmentKind::Position).unwrap(), b);
    }

    #[test]
    fn test_unmanaged_kind_fails_loudly() {
        let dir = TempDir::new().unwrap();
        let (_file, allocator) = open(&dir);

        let err = allocator.free(&FreeNode { address: Address(64), next: Address::NONE }).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(allocator.alloc(SegmentKind::DocumentChunk).is_err());
    }

    #[test]
    fn test_state_survives_reload() {
        let dir = TempDir::new().unwrap();
        let (file, allocator) = open(&dir);

        let a = allocator.alloc(SegmentKind::Position).unwrap();
        allocator.alloc(SegmentKind::Position).unwrap();
        allocator.free(&Position::new(a, 0)).unwrap();
        let bump = file.next_free();

        file.set_next_free(0);
        let reloaded = Allocator::load(file.clone(), allocator.address, TERM_INDEX_CLASSES).unwrap();
        assert_eq!(file.next_free(), bump);
        assert_eq!(reloaded.alloc(SegmentKind::Position).unwrap(), a);
    }
}
